//! Self-monitoring for the session pipeline.
//!
//! Two signals are watched: work queue depth and the failure rate of recent
//! steps. Each runs through an [`AlertStateMachine`] that only notifies when
//! its NORMAL/ALERTING state changes.
//!
//! # Example
//!
//! ```ignore
//! use sessionflow_monitor::{AlertMonitor, AlertRule, AlertStateMachine, LogNotifier, QueueLengthSource};
//!
//! let machine = AlertStateMachine::new(kv, AlertRule::new("queue_length", 10.0), vec![Arc::new(LogNotifier)]);
//! let handle = AlertMonitor::new(Arc::new(QueueLengthSource::new(queue)), machine)
//!     .with_interval(Duration::from_secs(60))
//!     .spawn();
//! ```

pub mod alert;
pub mod email;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod source;
pub mod window;

pub use alert::{
    AlertLevel, AlertRule, AlertStateMachine, DEFAULT_ALERT_STATE_TTL, Transition, alert_state_key,
};
pub use email::{DEFAULT_SMTP_PORT, EmailNotifier, SmtpSettings};
pub use error::{NotifyError, Result};
pub use monitor::{AlertMonitor, DEFAULT_POLL_INTERVAL, MonitorHandle};
pub use notifier::{LogNotifier, Notifier, WebhookFormat, WebhookNotifier, dispatch};
pub use source::{FailureRateSource, MetricSource, QueueLengthSource};
pub use window::{DEFAULT_WINDOW_CAPACITY, FailureWindow};
