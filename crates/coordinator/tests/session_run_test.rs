//! End-to-end session runs through the coordinator.
//!
//! Exercises lock contention, broadcast ordering and persistence against
//! the in-memory store with a real graph engine.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sessionflow_coordinator::{CoordinatorConfig, CoordinatorError, MISSING_TOPIC, WorkflowCoordinator};
use sessionflow_core::{SessionId, SessionState};
use sessionflow_events::{ALL_NODES, EventBus, EventStatus};
use sessionflow_store::testing::UnreachableStore;
use sessionflow_store::{
    InMemoryStore, KeyValueStore, LockManager, PersistenceMode, StateStore, lock_key,
};
use sessionflow_workflow::{
    AsyncFnStep, EngineConfig, FailingStep, GraphDefinition, GraphEngine, NoOpStep,
    Result as EngineResult, StepRegistry, WorkflowEngine,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn coordinator_with(
    kv: Arc<dyn KeyValueStore>,
    engine: Arc<dyn WorkflowEngine>,
    config: CoordinatorConfig,
) -> WorkflowCoordinator {
    WorkflowCoordinator::new(
        LockManager::new(kv.clone()),
        StateStore::new(kv.clone()),
        EventBus::new(kv),
        engine,
        config,
    )
}

fn pipeline_engine(registry: &StepRegistry) -> Result<Arc<dyn WorkflowEngine>, Box<dyn std::error::Error>> {
    let graph = GraphDefinition::linear(&["planner", "reporter"]);
    Ok(Arc::new(GraphEngine::new(&graph, registry, EngineConfig::default())?))
}

/// Engine that holds the session for a while and counts concurrent entries.
struct SlowEngine {
    inside: AtomicUsize,
    max_inside: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl WorkflowEngine for SlowEngine {
    async fn execute(&self, state: SessionState) -> EngineResult<SessionState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inside.fetch_sub(1, Ordering::SeqCst);
        Ok(state)
    }
}

/// GIVEN two runs for the same session submitted together
/// WHEN the lock wait is shorter than the first run
/// THEN exactly one runs and the other is told the session is busy
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_on_one_session_yield_busy() -> TestResult {
    let kv: Arc<dyn KeyValueStore> = InMemoryStore::new_arc();
    let engine = Arc::new(SlowEngine {
        inside: AtomicUsize::new(0),
        max_inside: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });
    let coord = coordinator_with(
        kv,
        engine.clone(),
        CoordinatorConfig::for_testing().with_lock_wait(Duration::from_millis(50)),
    );
    let id = SessionId::new("contended");

    let (a, b) = tokio::join!(
        coord.run_default(SessionState::with_topic("rust"), Some(id.clone())),
        coord.run_default(SessionState::with_topic("rust"), Some(id.clone())),
    );

    let busy = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(CoordinatorError::Busy { .. })))
        .count();
    assert_eq!(busy, 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.max_inside.load(Ordering::SeqCst), 1);
    Ok(())
}

/// GIVEN a two-node pipeline and a subscriber
/// WHEN a session completes
/// THEN the run-level events are START then COMPLETE with a summary
#[tokio::test]
async fn test_successful_run_broadcasts_start_then_complete() -> TestResult {
    let kv: Arc<dyn KeyValueStore> = InMemoryStore::new_arc();
    let registry = StepRegistry::new()
        .with(Arc::new(NoOpStep::new("planner")))
        .with(Arc::new(AsyncFnStep::new("reporter", |state: SessionState| async move {
            Ok(SessionState {
                report_paths: state.topic.map(|t| serde_json::json!([format!("/r/{t}.md")])),
                ..SessionState::default()
            })
        })));
    let coord = coordinator_with(kv.clone(), pipeline_engine(&registry)?, CoordinatorConfig::for_testing());
    let id = SessionId::new("happy");
    let mut sub = EventBus::new(kv).subscribe(&id).await?;

    let result = coord
        .run_default(SessionState::with_topic("rust"), Some(id.clone()))
        .await?;

    let run_level: Vec<_> = sub
        .drain()?
        .into_iter()
        .filter(|e| e.node == ALL_NODES)
        .collect();
    assert_eq!(
        run_level.iter().map(|e| e.status).collect::<Vec<_>>(),
        vec![EventStatus::Start, EventStatus::Complete]
    );
    let summary = run_level[1].summary.clone().unwrap_or_default();
    assert_eq!(summary.get("report_paths"), Some(&serde_json::json!(["/r/rust.md"])));
    assert_eq!(result.session_id, Some(id));
    Ok(())
}

/// GIVEN a state without a topic
/// WHEN it is run
/// THEN one ERROR is published, no START, the error is persisted and the
/// lock is free for the next run
#[tokio::test]
async fn test_missing_topic_publishes_only_error() -> TestResult {
    let kv: Arc<dyn KeyValueStore> = InMemoryStore::new_arc();
    let registry = StepRegistry::new()
        .with(Arc::new(NoOpStep::new("planner")))
        .with(Arc::new(NoOpStep::new("reporter")));
    let coord = coordinator_with(kv.clone(), pipeline_engine(&registry)?, CoordinatorConfig::for_testing());
    let id = SessionId::new("no-topic");
    let mut sub = EventBus::new(kv.clone()).subscribe(&id).await?;

    let err = coord
        .run(SessionState::with_topic("   "), Some(id.clone()), PersistenceMode::Single)
        .await
        .err()
        .ok_or("run should fail")?;

    let events = sub.drain()?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Error);
    assert_eq!(events[0].error.as_deref(), Some(MISSING_TOPIC));
    assert!(matches!(err, CoordinatorError::Validation { .. }));

    let stored = coord
        .get_existing(&id, PersistenceMode::Single)
        .await?
        .ok_or("state should be persisted")?;
    assert_eq!(stored.error.as_deref(), Some(MISSING_TOPIC));

    assert_eq!(kv.get(&lock_key(&id)).await?, None);
    let retry = coord
        .run(SessionState::with_topic("rust"), Some(id.clone()), PersistenceMode::Single)
        .await?;
    assert_eq!(retry.error, None);
    Ok(())
}

/// GIVEN a pipeline whose second step fails
/// WHEN the session runs
/// THEN the tagged error is returned, broadcast and persisted, and the
/// lock is released
#[tokio::test]
async fn test_engine_failure_is_persisted_and_broadcast() -> TestResult {
    let kv: Arc<dyn KeyValueStore> = InMemoryStore::new_arc();
    let registry = StepRegistry::new()
        .with(Arc::new(NoOpStep::new("planner")))
        .with(Arc::new(FailingStep::new("reporter", "disk full")));
    let coord = coordinator_with(kv.clone(), pipeline_engine(&registry)?, CoordinatorConfig::for_testing());
    let id = SessionId::new("broken");
    let mut sub = EventBus::new(kv.clone()).subscribe(&id).await?;

    let err = coord
        .run_default(SessionState::with_topic("rust"), Some(id.clone()))
        .await
        .err()
        .ok_or("run should fail")?;

    let response = err.to_state();
    assert_eq!(response.session_id, Some(id.clone()));
    assert_eq!(response.error.as_deref(), Some("step 'reporter' step_failed: disk full"));

    let last_run_event = sub
        .drain()?
        .into_iter()
        .rfind(|e| e.node == ALL_NODES)
        .ok_or("no run-level events")?;
    assert_eq!(last_run_event.status, EventStatus::Error);

    let stored = coord
        .get_existing(&id, PersistenceMode::Sharded)
        .await?
        .ok_or("state should be persisted")?;
    assert_eq!(stored.topic.as_deref(), Some("rust"));
    assert!(stored.error.is_some());

    assert_eq!(kv.get(&lock_key(&id)).await?, None);
    let retry = coord
        .run_default(SessionState::with_topic("rust"), Some(id.clone()))
        .await
        .err()
        .ok_or("step still fails")?;
    assert!(matches!(retry, CoordinatorError::Engine { .. }));
    Ok(())
}

/// GIVEN a store that refuses every connection
/// WHEN a session is run
/// THEN the caller gets a structured busy error rather than a crash
#[tokio::test]
async fn test_unreachable_store_reports_busy() -> TestResult {
    let kv: Arc<dyn KeyValueStore> = Arc::new(UnreachableStore);
    let registry = StepRegistry::new()
        .with(Arc::new(NoOpStep::new("planner")))
        .with(Arc::new(NoOpStep::new("reporter")));
    let coord = coordinator_with(
        kv,
        pipeline_engine(&registry)?,
        CoordinatorConfig::for_testing().with_lock_wait(Duration::ZERO),
    );

    let err = coord
        .run_default(SessionState::with_topic("rust"), Some(SessionId::new("down")))
        .await
        .err()
        .ok_or("run should fail")?;

    assert!(matches!(err, CoordinatorError::Busy { .. }));
    assert_eq!(err.to_state().session_id, Some(SessionId::new("down")));
    Ok(())
}
