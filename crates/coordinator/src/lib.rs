//! Session coordination.
//!
//! [`WorkflowCoordinator`] wraps one engine run in the session lock and owns
//! every side effect around it: loading and merging state, broadcasting
//! START/COMPLETE/ERROR, and persisting the outcome. [`SessionWorker`]
//! drains the work queue into it.
//!
//! # Example
//!
//! ```ignore
//! use sessionflow_coordinator::{CoordinatorConfig, WorkflowCoordinator};
//!
//! let coordinator = WorkflowCoordinator::new(locks, states, events, engine, CoordinatorConfig::default());
//!
//! match coordinator.run_default(SessionState::with_topic("rust"), None).await {
//!     Ok(state) => println!("done: {:?}", state.report_paths),
//!     Err(e) => println!("{}", serde_json::to_string(&e.to_state())?),
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod worker;

pub use config::{CoordinatorConfig, WorkerConfig};
pub use coordinator::{RunResult, WorkflowCoordinator};
pub use error::{CoordinatorError, MISSING_TOPIC};
pub use worker::{SessionWorker, WorkerHandle, WorkerOutcome};
