//! Core types, errors, and session state shared across sessionflow crates.

pub mod error;
pub mod session;

pub use error::{Error, Result, ResultExt};
pub use session::{SessionId, SessionState, SessionStatus};
