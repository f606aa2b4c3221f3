//! Graph-driven workflow engine with a typed step registry.
//!
//! This crate runs a session's pipeline. Key features include:
//!
//! - **Typed steps**: each step implements [`Step`] and is registered by
//!   name in a [`StepRegistry`]; nothing is loaded dynamically.
//! - **Declarative graph**: a [`GraphDefinition`] (JSON or TOML) lists nodes
//!   and edges; it is validated and ordered once at startup.
//! - **Tagged errors**: the engine returns [`EngineError`] with an
//!   [`EngineErrorKind`] instead of stuffing an error string into state.
//! - **Timeouts and retries**: per-step time budget, optional retries with
//!   exponential backoff.
//!
//! # Example
//!
//! ```ignore
//! use sessionflow_workflow::{
//!     EngineConfig, GraphDefinition, GraphEngine, NoOpStep, StepRegistry, WorkflowEngine,
//! };
//! use std::sync::Arc;
//!
//! let registry = StepRegistry::new()
//!     .with(Arc::new(NoOpStep::new("planner")))
//!     .with(Arc::new(NoOpStep::new("reporter")));
//! let graph = GraphDefinition::linear(&["planner", "reporter"]);
//! let engine = GraphEngine::new(&graph, &registry, EngineConfig::default())?;
//!
//! let final_state = engine.execute(state).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod engine;
pub mod error;
pub mod graph;
pub mod step;

pub use engine::{EngineConfig, GraphEngine, StepObserver, StepOutcome, WorkflowEngine};
pub use error::{EngineError, EngineErrorKind, Result, StepError};
pub use graph::{DEFAULT_PIPELINE, Edge, ExecutionPlan, GraphDefinition, NodeSpec, PlannedNode};
pub use step::{AsyncFnStep, FailingStep, FnStep, NoOpStep, Step, StepRegistry, StepResult};
