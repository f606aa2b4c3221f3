//! Workflow execution engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use sessionflow_core::SessionState;
use sessionflow_events::{EventBus, SessionEvent};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::graph::{ExecutionPlan, GraphDefinition, PlannedNode};
use crate::step::StepRegistry;

/// The boundary the coordinator drives.
///
/// Implementations take the merged session state and return the final
/// state, or a tagged error. They hold no locks and persist nothing.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn execute(&self, state: SessionState) -> Result<SessionState>;
}

/// How a single step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

impl StepOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Receives every step outcome, e.g. to feed a failure-rate window.
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn step_finished(&self, node: &str, outcome: StepOutcome);
}

/// Configuration for the graph engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time budget per step unless the node overrides it.
    pub step_timeout: Duration,
    /// Extra attempts after a retryable failure.
    pub max_retries: u32,
    /// Base delay between attempts; doubles each retry.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(300),
            max_retries: 0,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Engine that walks an [`ExecutionPlan`] built from a graph definition.
///
/// Each step's update is merged into the running state before the next
/// step starts. A step that fails (by error, timeout, or by setting
/// `error` in its update) stops the run.
pub struct GraphEngine {
    plan: ExecutionPlan,
    config: EngineConfig,
    events: Option<EventBus>,
    observers: Vec<Arc<dyn StepObserver>>,
}

impl GraphEngine {
    /// Resolve `graph` against `registry` and build an engine for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is malformed or names unregistered
    /// steps.
    pub fn new(
        graph: &GraphDefinition,
        registry: &StepRegistry,
        config: EngineConfig,
    ) -> Result<Self> {
        let plan = graph.plan(registry)?;
        info!(nodes = ?plan.order(), "Workflow graph resolved");
        Ok(Self {
            plan,
            config,
            events: None,
            observers: Vec::new(),
        })
    }

    /// Publish per-node START/COMPLETE/ERROR events.
    #[must_use]
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Report step outcomes to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub const fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    async fn run_node(&self, node: &PlannedNode, state: &SessionState) -> Result<SessionState> {
        let timeout = node.timeout.unwrap_or(self.config.step_timeout);
        let mut attempt: u32 = 0;

        loop {
            let error = match tokio::time::timeout(timeout, node.step.run(state)).await {
                Ok(Ok(update)) if update.error.is_none() => return Ok(update),
                Ok(Ok(update)) => {
                    EngineError::step_failed(&node.node, update.error.unwrap_or_default())
                }
                Ok(Err(e)) => EngineError::step_failed(&node.node, e.message()),
                Err(_) => EngineError::step_timeout(&node.node, timeout.as_secs()),
            };

            if attempt >= self.config.max_retries || !error.is_retryable() {
                return Err(error);
            }

            let backoff = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt));
            warn!(
                node = %node.node,
                attempt = attempt + 1,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Step failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn report(&self, node: &str, outcome: StepOutcome) {
        counter!(
            "sessionflow_step_runs_total",
            "step" => node.to_string(),
            "result" => outcome.as_str()
        )
        .increment(1);
        for observer in &self.observers {
            observer.step_finished(node, outcome).await;
        }
    }

    async fn publish(&self, event: impl FnOnce() -> Option<SessionEvent>) {
        if let (Some(bus), Some(event)) = (&self.events, event()) {
            bus.publish(&event).await;
        }
    }
}

#[async_trait]
impl WorkflowEngine for GraphEngine {
    async fn execute(&self, mut state: SessionState) -> Result<SessionState> {
        let session_id = state.session_id.clone();
        let started = Instant::now();

        for node in self.plan.nodes() {
            debug!(node = %node.node, step = node.step.name(), "Executing step");
            self.publish(|| {
                session_id
                    .clone()
                    .map(|id| SessionEvent::start(id, node.node.as_str()))
            })
            .await;

            match self.run_node(node, &state).await {
                Ok(update) => {
                    state.merge(update);
                    self.report(&node.node, StepOutcome::Succeeded).await;
                    self.publish(|| {
                        session_id
                            .clone()
                            .map(|id| SessionEvent::complete(id, node.node.as_str(), None))
                    })
                    .await;
                }
                Err(error) => {
                    warn!(node = %node.node, error = %error, "Step failed");
                    self.report(&node.node, StepOutcome::Failed).await;
                    self.publish(|| {
                        session_id
                            .clone()
                            .map(|id| SessionEvent::error(id, node.node.as_str(), error.message()))
                    })
                    .await;
                    return Err(error);
                }
            }
        }

        info!(
            steps = self.plan.nodes().len(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Workflow completed"
        );
        Ok(state)
    }
}
