//! Session run coordination.
//!
//! A run loads any persisted state, takes the session lock, validates,
//! hands the merged state to the engine, broadcasts the outcome and
//! persists it. Busy sessions are rejected without touching anything.

use std::sync::Arc;

use metrics::counter;
use sessionflow_core::{ResultExt, SessionId, SessionState};
use sessionflow_events::{ALL_NODES, EventBus, SessionEvent};
use sessionflow_store::{LockManager, PersistenceMode, StateStore};
use sessionflow_workflow::WorkflowEngine;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, MISSING_TOPIC};

/// Result of a coordinated run.
pub type RunResult = std::result::Result<SessionState, CoordinatorError>;

/// Runs sessions through the engine under a per-session lock.
#[derive(Clone)]
pub struct WorkflowCoordinator {
    locks: LockManager,
    states: StateStore,
    events: EventBus,
    engine: Arc<dyn WorkflowEngine>,
    config: CoordinatorConfig,
}

impl WorkflowCoordinator {
    /// Create a coordinator from injected components.
    pub fn new(
        locks: LockManager,
        states: StateStore,
        events: EventBus,
        engine: Arc<dyn WorkflowEngine>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            locks,
            states,
            events,
            engine,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run a session using the configured persistence mode.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_default(
        &self,
        initial: SessionState,
        session_id: Option<SessionId>,
    ) -> RunResult {
        self.run(initial, session_id, self.config.mode).await
    }

    /// Run a session to completion.
    ///
    /// Without a `session_id` a fresh one is generated and nothing is
    /// loaded. The returned state always carries `_session_id`.
    ///
    /// # Errors
    ///
    /// - `Busy` if the lock could not be taken within the configured wait;
    ///   nothing was persisted or published.
    /// - `Validation` if the merged state has no topic.
    /// - `Engine` if the engine failed; the failure is persisted.
    pub async fn run(
        &self,
        initial: SessionState,
        session_id: Option<SessionId>,
        mode: PersistenceMode,
    ) -> RunResult {
        let (session_id, state) = match session_id {
            Some(id) => {
                let existing = self
                    .states
                    .load(mode, &id)
                    .await
                    .into_option_logged("load session state")
                    .flatten()
                    .unwrap_or_default();
                (id, existing)
            }
            None => (SessionId::generate(), SessionState::new()),
        };

        let mut state = state.merged(initial);
        state.session_id = Some(session_id.clone());

        let Some(token) = self
            .locks
            .acquire(&session_id, self.config.lock_ttl, self.config.lock_wait)
            .await
        else {
            info!(session_id = %session_id, "Session busy");
            counter!("sessionflow_session_runs_total", "outcome" => "busy").increment(1);
            return Err(CoordinatorError::busy(session_id));
        };

        let result = self.run_locked(&session_id, state, mode).await;

        if self.locks.release(&session_id, &token).await {
            debug!(session_id = %session_id, token = %token, "Session lock released");
        } else {
            warn!(
                session_id = %session_id,
                "Session lock was not released; it expired or changed hands during the run"
            );
        }

        let outcome = match &result {
            Ok(_) => "completed",
            Err(e) => e.as_str(),
        };
        counter!("sessionflow_session_runs_total", "outcome" => outcome).increment(1);
        result
    }

    async fn run_locked(
        &self,
        session_id: &SessionId,
        mut state: SessionState,
        mode: PersistenceMode,
    ) -> RunResult {
        if state.topic().is_none() {
            let err = CoordinatorError::validation(session_id.clone(), MISSING_TOPIC);
            self.fail(session_id, state, &err, mode).await;
            return Err(err);
        }

        // A retried session starts clean; the previous failure is not carried forward.
        if let Some(previous) = state.error.take() {
            debug!(session_id = %session_id, previous = %previous, "Clearing error from earlier run");
        }

        self.events
            .publish(&SessionEvent::start(session_id.clone(), ALL_NODES))
            .await;
        info!(session_id = %session_id, "Session run started");

        match self.engine.execute(state.clone()).await {
            Ok(mut result) => {
                if result
                    .session_id
                    .as_ref()
                    .is_some_and(|returned| returned != session_id)
                {
                    warn!(
                        session_id = %session_id,
                        returned = ?result.session_id,
                        "Engine returned a different session id; overriding"
                    );
                }
                result.session_id = Some(session_id.clone());

                self.events
                    .publish(&SessionEvent::complete(
                        session_id.clone(),
                        ALL_NODES,
                        Some(result.summary()),
                    ))
                    .await;
                self.persist(session_id, &result, mode).await;
                info!(session_id = %session_id, "Session run completed");
                Ok(result)
            }
            Err(engine_error) => {
                let err = CoordinatorError::engine(session_id.clone(), engine_error);
                self.fail(session_id, state, &err, mode).await;
                Err(err)
            }
        }
    }

    /// Broadcast the failure and persist `state` tagged with it.
    async fn fail(
        &self,
        session_id: &SessionId,
        mut state: SessionState,
        err: &CoordinatorError,
        mode: PersistenceMode,
    ) {
        let message = err.to_string();
        error!(session_id = %session_id, kind = err.as_str(), error = %message, "Session run failed");

        self.events
            .publish(&SessionEvent::error(session_id.clone(), ALL_NODES, &*message))
            .await;
        state.error = Some(message);
        self.persist(session_id, &state, mode).await;
    }

    async fn persist(&self, session_id: &SessionId, state: &SessionState, mode: PersistenceMode) {
        if let Err(e) = self.states.save(mode, session_id, state).await {
            error!(session_id = %session_id, error = %e, "Failed to persist session state");
        }
    }

    /// Read persisted state without running anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the record is malformed.
    pub async fn get_existing(
        &self,
        session_id: &SessionId,
        mode: PersistenceMode,
    ) -> sessionflow_core::Result<Option<SessionState>> {
        self.states.load(mode, session_id).await
    }

    /// Forget a session's persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reset(
        &self,
        session_id: &SessionId,
        mode: PersistenceMode,
    ) -> sessionflow_core::Result<()> {
        self.states.remove(mode, session_id).await?;
        debug!(session_id = %session_id, "Session state reset");
        Ok(())
    }
}
