//! Wires the components together.
//!
//! Every shared client is built once here and handed to the components
//! that need it.

use std::sync::Arc;

use anyhow::{Context, Result};
use sessionflow_coordinator::{SessionWorker, WorkflowCoordinator};
use sessionflow_core::SessionId;
use sessionflow_events::EventBus;
use sessionflow_monitor::{
    AlertMonitor, AlertRule, AlertStateMachine, EmailNotifier, FailureRateSource, FailureWindow,
    LogNotifier, Notifier, QueueLengthSource, WebhookFormat, WebhookNotifier,
};
use sessionflow_store::{KeyValueStore, LockManager, ResultCache, StateStore, WorkQueue};
use sessionflow_workflow::{GraphDefinition, GraphEngine};
use tracing::info;

use crate::config::AppConfig;
use crate::steps::builtin_registry;

/// Alert type names.
pub const QUEUE_LENGTH_ALERT: &str = "queue_length";
pub const FAILURE_RATE_ALERT: &str = "failure_rate";

/// The assembled service.
pub struct App {
    config: AppConfig,
    store: Arc<dyn KeyValueStore>,
    queue: WorkQueue,
    states: StateStore,
    events: EventBus,
    coordinator: WorkflowCoordinator,
    failures: Arc<FailureWindow>,
}

impl App {
    /// Build every component on top of `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be resolved against the
    /// built-in steps.
    pub fn build(
        config: AppConfig,
        graph: &GraphDefinition,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let states = StateStore::with_ttl(store.clone(), config.state_ttl());
        let events = EventBus::new(store.clone());
        let queue = WorkQueue::named(store.clone(), &config.queue_name);
        let failures = Arc::new(FailureWindow::new(config.failure_window));

        let registry = builtin_registry(ResultCache::new(store.clone()));
        let engine = GraphEngine::new(graph, &registry, config.engine())
            .context("Workflow graph does not resolve against the registered steps")?
            .with_events(events.clone())
            .with_observer(failures.clone());

        let coordinator = WorkflowCoordinator::new(
            LockManager::new(store.clone()),
            states.clone(),
            events.clone(),
            Arc::new(engine),
            config.coordinator(),
        );

        Ok(Self {
            config,
            store,
            queue,
            states,
            events,
            coordinator,
            failures,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn coordinator(&self) -> &WorkflowCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub const fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Queue a new session for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue rejects the item.
    pub async fn submit(&self, topic: &str) -> Result<SessionId> {
        let session_id = SessionId::generate();
        self.queue
            .enqueue(&session_id, topic)
            .await
            .with_context(|| format!("Failed to queue topic '{topic}'"))?;
        info!(session_id = %session_id, topic, "Session queued");
        Ok(session_id)
    }

    #[must_use]
    pub fn worker(&self) -> SessionWorker {
        SessionWorker::new(
            self.queue.clone(),
            self.states.clone(),
            self.coordinator.clone(),
            self.config.worker(),
        )
    }

    /// Notifiers named by the configuration; the log notifier is always on.
    ///
    /// # Errors
    ///
    /// Returns an error if a webhook client or the SMTP transport cannot be
    /// built.
    pub fn notifiers(&self) -> Result<Vec<Arc<dyn Notifier>>> {
        let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        if self.config.smtp.is_enabled() {
            notifiers.push(Arc::new(
                EmailNotifier::new(&self.config.smtp).context("Failed to build email notifier")?,
            ));
        }
        if let Some(url) = &self.config.cloud_alert_webhook {
            notifiers.push(Arc::new(
                WebhookNotifier::new("cloud", url, WebhookFormat::Json)
                    .context("Failed to build cloud alert client")?,
            ));
        }
        if let Some(url) = &self.config.chat_alert_webhook {
            notifiers.push(Arc::new(
                WebhookNotifier::new("chat", url, WebhookFormat::ChatText)
                    .context("Failed to build chat alert client")?,
            ));
        }
        Ok(notifiers)
    }

    /// Queue-length and failure-rate monitors.
    ///
    /// # Errors
    ///
    /// Returns an error if the notifiers cannot be built.
    #[allow(clippy::cast_precision_loss)]
    pub fn monitors(&self) -> Result<Vec<AlertMonitor>> {
        let notifiers = self.notifiers()?;
        let machine = |alert_type: &str, threshold: f64| {
            AlertStateMachine::new(
                self.store.clone(),
                AlertRule::new(alert_type, threshold),
                notifiers.clone(),
            )
            .with_state_ttl(self.config.alert_state_ttl())
        };

        Ok(vec![
            AlertMonitor::new(
                Arc::new(QueueLengthSource::new(self.queue.clone())),
                machine(QUEUE_LENGTH_ALERT, self.config.queue_alert_threshold as f64),
            )
            .with_interval(self.config.job_interval()),
            AlertMonitor::new(
                Arc::new(FailureRateSource::new(self.failures.clone())),
                machine(FAILURE_RATE_ALERT, self.config.failure_rate_threshold),
            )
            .with_interval(self.config.job_interval()),
        ])
    }
}
