#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # sessionflow
//!
//! Distributed workflow-session coordinator.
//!
//! This library assembles the workspace crates into a runnable service and
//! re-exports them for convenience.

pub use sessionflow_coordinator;
pub use sessionflow_core;
pub use sessionflow_events;
pub use sessionflow_monitor;
pub use sessionflow_store;
pub use sessionflow_workflow;

pub mod app;
pub mod cli;
pub mod config;
pub mod steps;

pub use app::App;
pub use cli::Cli;
pub use config::AppConfig;
