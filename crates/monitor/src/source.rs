//! Metric sources the alert monitors sample.

use std::sync::Arc;

use async_trait::async_trait;
use sessionflow_store::WorkQueue;

use crate::metrics;
use crate::window::FailureWindow;

/// A sampled value. `None` means the value is unavailable this poll.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn sample(&self) -> Option<f64>;
}

/// Samples the work queue's length.
pub struct QueueLengthSource {
    queue: WorkQueue,
}

impl QueueLengthSource {
    pub const fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl MetricSource for QueueLengthSource {
    #[allow(clippy::cast_precision_loss)]
    async fn sample(&self) -> Option<f64> {
        let len = self.queue.len().await?;
        metrics::set_queue_length(len);
        Some(len as f64)
    }
}

/// Samples the failure rate of recent step outcomes.
pub struct FailureRateSource {
    window: Arc<FailureWindow>,
}

impl FailureRateSource {
    pub const fn new(window: Arc<FailureWindow>) -> Self {
        Self { window }
    }
}

#[async_trait]
impl MetricSource for FailureRateSource {
    async fn sample(&self) -> Option<f64> {
        let rate = self.window.failure_rate().await;
        metrics::set_failure_rate(rate);
        Some(rate)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sessionflow_core::SessionId;
    use sessionflow_store::InMemoryStore;
    use sessionflow_store::testing::UnreachableStore;

    #[tokio::test]
    async fn test_queue_length_sample() {
        let queue = WorkQueue::new(InMemoryStore::new_arc());
        queue.enqueue(&SessionId::new("a"), "rust").await.unwrap();
        queue.enqueue(&SessionId::new("b"), "go").await.unwrap();

        let sample = QueueLengthSource::new(queue).sample().await;

        assert_eq!(sample, Some(2.0));
    }

    #[tokio::test]
    async fn test_queue_length_unavailable() {
        let queue = WorkQueue::new(Arc::new(UnreachableStore));
        assert_eq!(QueueLengthSource::new(queue).sample().await, None);
    }

    #[tokio::test]
    async fn test_failure_rate_sample() {
        let window = Arc::new(FailureWindow::new(4));
        window.record(false).await;

        let sample = FailureRateSource::new(window).sample().await;

        assert_eq!(sample, Some(1.0));
    }
}
