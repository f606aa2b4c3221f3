//! Sliding window of step outcomes.

use std::collections::VecDeque;

use async_trait::async_trait;
use sessionflow_workflow::{StepObserver, StepOutcome};
use tokio::sync::Mutex;
use tracing::trace;

/// Default number of outcomes kept.
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// Fixed-capacity ring of recent step outcomes (`true` = success).
#[derive(Debug)]
pub struct FailureWindow {
    capacity: usize,
    outcomes: Mutex<VecDeque<bool>>,
}

impl Default for FailureWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

impl FailureWindow {
    /// A window holding at most `capacity` outcomes (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an outcome, dropping the oldest when full.
    pub async fn record(&self, success: bool) {
        let mut outcomes = self.outcomes.lock().await;
        if outcomes.len() == self.capacity {
            outcomes.pop_front();
        }
        outcomes.push_back(success);
        trace!(success, window = outcomes.len(), "Step outcome recorded");
    }

    pub async fn len(&self) -> usize {
        self.outcomes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outcomes.lock().await.is_empty()
    }

    /// Failures divided by outcomes held; 0.0 when empty.
    #[allow(clippy::cast_precision_loss)]
    pub async fn failure_rate(&self) -> f64 {
        let outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            return 0.0;
        }
        let failures = outcomes.iter().filter(|success| !**success).count();
        failures as f64 / outcomes.len() as f64
    }
}

#[async_trait]
impl StepObserver for FailureWindow {
    async fn step_finished(&self, _node: &str, outcome: StepOutcome) {
        self.record(outcome == StepOutcome::Succeeded).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_empty_window_has_zero_rate() {
        let window = FailureWindow::default();
        assert!(window.is_empty().await);
        assert!(window.failure_rate().await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_rate_counts_failures() {
        let window = FailureWindow::new(4);
        for success in [true, false, true, false] {
            window.record(success).await;
        }
        assert!((window.failure_rate().await - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_drops_oldest_at_capacity() {
        let window = FailureWindow::new(2);
        window.record(false).await;
        window.record(true).await;
        window.record(true).await;

        assert_eq!(window.len().await, 2);
        assert!(window.failure_rate().await.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_observes_engine_outcomes() {
        let window = FailureWindow::new(10);
        window.step_finished("coder", StepOutcome::Failed).await;
        window.step_finished("coder", StepOutcome::Succeeded).await;

        assert!((window.failure_rate().await - 0.5).abs() < f64::EPSILON);
    }

    proptest! {
        /// The window never grows past capacity and always reflects the
        /// most recent outcomes.
        #[test]
        fn test_prop_window_keeps_latest_outcomes(
            capacity in 1usize..20,
            outcomes in proptest::collection::vec(any::<bool>(), 0..60),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (len, rate) = rt.block_on(async {
                let window = FailureWindow::new(capacity);
                for success in &outcomes {
                    window.record(*success).await;
                }
                (window.len().await, window.failure_rate().await)
            });

            let tail: Vec<bool> = outcomes
                .iter()
                .rev()
                .take(capacity)
                .copied()
                .collect();
            prop_assert_eq!(len, tail.len());

            #[allow(clippy::cast_precision_loss)]
            let expected = if tail.is_empty() {
                0.0
            } else {
                tail.iter().filter(|s| !**s).count() as f64 / tail.len() as f64
            };
            prop_assert!((rate - expected).abs() < 1e-9);
        }
    }
}
