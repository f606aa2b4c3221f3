//! Step trait and the typed step registry.

use async_trait::async_trait;
use sessionflow_core::SessionState;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::StepError;

/// Result of running one step: the fields it changed, or a failure.
pub type StepResult = std::result::Result<SessionState, StepError>;

/// One unit of pipeline work.
///
/// A step reads the accumulated session state and returns an update. The
/// engine merges the update on top of the state before the next step runs,
/// so a step only needs to fill the fields it produces.
#[async_trait]
pub trait Step: Send + Sync {
    /// Run the step.
    async fn run(&self, state: &SessionState) -> StepResult;

    /// Get the step name (for logging/debugging).
    fn name(&self) -> &str;
}

/// Registry of steps, keyed by the name graph nodes refer to.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under an explicit name.
    pub fn register(&mut self, name: impl Into<String>, step: Arc<dyn Step>) {
        self.steps.insert(name.into(), step);
    }

    /// Register a step under its own name, builder style.
    #[must_use]
    pub fn with(mut self, step: Arc<dyn Step>) -> Self {
        self.register(step.name().to_string(), step);
        self
    }

    /// Get a step by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    /// Check if a step exists for the given name.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Get all registered step names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A step that changes nothing. Useful as a placeholder node.
pub struct NoOpStep {
    name: String,
}

impl NoOpStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Step for NoOpStep {
    async fn run(&self, _state: &SessionState) -> StepResult {
        Ok(SessionState::default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A step that always fails (for testing).
pub struct FailingStep {
    name: String,
    error_message: String,
}

impl FailingStep {
    pub fn new(name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error_message: error_message.into(),
        }
    }
}

#[async_trait]
impl Step for FailingStep {
    async fn run(&self, _state: &SessionState) -> StepResult {
        Err(StepError::new(&*self.error_message))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A step that runs a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&SessionState) -> StepResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&SessionState) -> StepResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&SessionState) -> StepResult + Send + Sync,
{
    async fn run(&self, state: &SessionState) -> StepResult {
        (self.func)(state)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A step that delegates to an async function taking an owned snapshot.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(SessionState) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    name: String,
    func: F,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(SessionState) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(SessionState) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    async fn run(&self, state: &SessionState) -> StepResult {
        (self.func)(state.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
