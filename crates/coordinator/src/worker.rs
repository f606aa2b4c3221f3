//! Queue consumer that feeds sessions to the coordinator.

use std::time::Duration;

use sessionflow_core::SessionState;
use sessionflow_store::{DequeueMode, QueueItem, StateStore, WorkQueue};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::coordinator::WorkflowCoordinator;
use crate::error::CoordinatorError;

/// What one poll of the queue did.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// Nothing to do.
    Idle,
    /// The session already finished; the item was dropped.
    Skipped(QueueItem),
    /// The run completed.
    Completed(SessionState),
    /// The run ended with a structured failure.
    Failed(CoordinatorError),
}

/// Pulls queued sessions and runs them one at a time.
#[derive(Clone)]
pub struct SessionWorker {
    queue: WorkQueue,
    states: StateStore,
    coordinator: WorkflowCoordinator,
    config: WorkerConfig,
}

impl SessionWorker {
    pub fn new(
        queue: WorkQueue,
        states: StateStore,
        coordinator: WorkflowCoordinator,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            states,
            coordinator,
            config,
        }
    }

    /// Take one item off the queue and run it unless it already finished.
    pub async fn process_next(&self) -> WorkerOutcome {
        let Some(item) = self
            .queue
            .dequeue(DequeueMode::Blocking(self.config.dequeue_timeout))
            .await
        else {
            return WorkerOutcome::Idle;
        };

        if self.already_finished(&item).await {
            info!(session_id = %item.session_id, "Session already finished; skipping");
            return WorkerOutcome::Skipped(item);
        }

        info!(session_id = %item.session_id, topic = %item.topic, "Processing queued session");
        match self
            .coordinator
            .run(
                SessionState::with_topic(item.topic.as_str()),
                Some(item.session_id.clone()),
                self.config.mode,
            )
            .await
        {
            Ok(state) => WorkerOutcome::Completed(state),
            Err(e) => {
                warn!(session_id = %item.session_id, error = %e, "Queued session failed");
                WorkerOutcome::Failed(e)
            }
        }
    }

    /// A store failure here is logged and treated as "not finished"; the
    /// coordinator loads state again under the lock.
    async fn already_finished(&self, item: &QueueItem) -> bool {
        match self.states.load(self.config.mode, &item.session_id).await {
            Ok(existing) => existing.is_some_and(|state| state.is_finished()),
            Err(e) => {
                warn!(
                    session_id = %item.session_id,
                    error = %e,
                    "Idempotency check failed; running anyway"
                );
                false
            }
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Shutdown is observed between runs; an in-flight run is never
    /// interrupted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.queue.key(), "Session worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.process_next().await {
                WorkerOutcome::Idle => self.config.idle_sleep,
                WorkerOutcome::Skipped(_)
                | WorkerOutcome::Completed(_)
                | WorkerOutcome::Failed(_) => Duration::ZERO,
            };
            if pause.is_zero() {
                continue;
            }

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(queue = %self.queue.key(), "Session worker stopped");
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(stop_rx).await });
        WorkerHandle { stop_tx, join }
    }
}

/// Handle to a spawned [`SessionWorker`].
pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop after its current run and wait for it.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Session worker task ended abnormally");
        }
        debug!("Session worker joined");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use async_trait::async_trait;
    use sessionflow_core::SessionId;
    use sessionflow_events::EventBus;
    use sessionflow_store::{InMemoryStore, LockManager, PersistenceMode};
    use sessionflow_workflow::{Result as EngineResult, WorkflowEngine};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ReportingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkflowEngine for ReportingEngine {
        async fn execute(&self, state: SessionState) -> EngineResult<SessionState> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SessionState {
                report_paths: Some(serde_json::json!(["/r/report.md"])),
                ..state
            })
        }
    }

    fn worker(kv: &Arc<InMemoryStore>, engine: Arc<ReportingEngine>) -> (SessionWorker, WorkQueue) {
        let states = StateStore::new(kv.clone());
        let coordinator = WorkflowCoordinator::new(
            LockManager::new(kv.clone()),
            states.clone(),
            EventBus::new(kv.clone()),
            engine,
            CoordinatorConfig::for_testing(),
        );
        let queue = WorkQueue::new(kv.clone());
        let worker = SessionWorker::new(
            queue.clone(),
            states,
            coordinator,
            WorkerConfig::for_testing(),
        );
        (worker, queue)
    }

    #[tokio::test]
    async fn test_report_idle_on_empty_queue() {
        let kv = InMemoryStore::new_arc();
        let (worker, _) = worker(&kv, Arc::new(ReportingEngine::default()));

        assert_eq!(worker.process_next().await, WorkerOutcome::Idle);
    }

    #[tokio::test]
    async fn test_run_queued_session() {
        let kv = InMemoryStore::new_arc();
        let engine = Arc::new(ReportingEngine::default());
        let (worker, queue) = worker(&kv, engine.clone());
        queue.enqueue(&SessionId::new("q1"), "rust").await.unwrap();

        let outcome = worker.process_next().await;

        assert!(
            matches!(&outcome, WorkerOutcome::Completed(state) if state.topic.as_deref() == Some("rust")),
            "unexpected outcome: {outcome:?}"
        );
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_finished_session() {
        let kv = InMemoryStore::new_arc();
        let engine = Arc::new(ReportingEngine::default());
        let (worker, queue) = worker(&kv, engine.clone());
        let id = SessionId::new("q2");
        let done = SessionState {
            topic: Some("rust".to_string()),
            audio_path: Some("/a.mp3".to_string()),
            ..SessionState::default()
        };
        StateStore::new(kv.clone())
            .save(PersistenceMode::Sharded, &id, &done)
            .await
            .unwrap();
        queue.enqueue(&id, "rust").await.unwrap();

        let outcome = worker.process_next().await;

        assert!(matches!(outcome, WorkerOutcome::Skipped(item) if item.session_id == id));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_on_shutdown() {
        let kv = InMemoryStore::new_arc();
        let engine = Arc::new(ReportingEngine::default());
        let (worker, queue) = worker(&kv, engine.clone());
        queue.enqueue(&SessionId::new("q3"), "rust").await.unwrap();

        let handle = worker.spawn();
        for _ in 0..100 {
            if engine.calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len().await, Some(0));
    }
}
