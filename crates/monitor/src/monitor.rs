//! Polling loop that drives an [`AlertStateMachine`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::{AlertStateMachine, Transition};
use crate::source::MetricSource;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Samples a source and feeds the state machine, one poll at a time.
pub struct AlertMonitor {
    source: Arc<dyn MetricSource>,
    machine: AlertStateMachine,
    interval: Duration,
}

impl AlertMonitor {
    pub fn new(source: Arc<dyn MetricSource>, machine: AlertStateMachine) -> Self {
        Self {
            source,
            machine,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sample once and evaluate. An unavailable sample skips the poll.
    pub async fn poll_once(&self) -> Option<Transition> {
        let alert_type = &self.machine.rule().alert_type;
        let Some(value) = self.source.sample().await else {
            warn!(alert_type = %alert_type, "Metric unavailable; skipping poll");
            return None;
        };
        self.machine.evaluate(value).await
    }

    /// Poll every interval until `shutdown` flips to `true` or its sender
    /// is dropped. The next poll starts only after the previous one ends.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let alert_type = self.machine.rule().alert_type.clone();
        info!(
            alert_type = %alert_type,
            interval_secs = self.interval.as_secs(),
            threshold = self.machine.rule().threshold,
            "Alert monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Some(transition) = self.poll_once().await {
                debug!(alert_type = %alert_type, transition = transition.as_str(), "Poll changed alert state");
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(alert_type = %alert_type, "Alert monitor stopped");
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(stop_rx).await });
        MonitorHandle { stop_tx, join }
    }
}

/// Handle to a spawned [`AlertMonitor`].
pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop polling and wait for the loop to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Alert monitor task ended abnormally");
        }
    }
}
