//! Metric names and recording helpers.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `sessionflow_queue_length` | Gauge | - |
//! | `sessionflow_failure_rate` | Gauge | - |
//! | `sessionflow_alert_transitions_total` | Counter | `alert_type`, `transition` |
//!
//! No recorder is installed here; without one every call is a no-op.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Gauge: items waiting in the work queue.
    pub const QUEUE_LENGTH: &str = "sessionflow_queue_length";
    /// Gauge: share of failed steps in the outcome window.
    pub const FAILURE_RATE: &str = "sessionflow_failure_rate";
    /// Counter: alert state changes.
    pub const ALERT_TRANSITIONS_TOTAL: &str = "sessionflow_alert_transitions_total";
}

/// Label keys used across metrics.
pub mod labels {
    pub const ALERT_TYPE: &str = "alert_type";
    /// `alert` or `recovery`.
    pub const TRANSITION: &str = "transition";
}

#[allow(clippy::cast_precision_loss)] // queue lengths stay far below 2^52
pub fn set_queue_length(len: usize) {
    gauge!(names::QUEUE_LENGTH).set(len as f64);
}

pub fn set_failure_rate(rate: f64) {
    gauge!(names::FAILURE_RATE).set(rate);
}

pub fn record_transition(alert_type: &str, transition: &'static str) {
    counter!(
        names::ALERT_TRANSITIONS_TOTAL,
        labels::ALERT_TYPE => alert_type.to_string(),
        labels::TRANSITION => transition,
    )
    .increment(1);
}
