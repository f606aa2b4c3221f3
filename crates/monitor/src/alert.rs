//! Hysteresis alerting.
//!
//! Each alert type is NORMAL or ALERTING, persisted under
//! `alert:state:<type>` with an expiry. Notifiers fire only when the state
//! changes, never once per poll. A missing record reads as NORMAL, so a
//! monitor that stops refreshing its record falls back to NORMAL once the
//! expiry passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use sessionflow_store::KeyValueStore;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::notifier::{Notifier, dispatch};

/// Default lifetime of a persisted alert state.
pub const DEFAULT_ALERT_STATE_TTL: Duration = Duration::from_secs(60 * 60);

/// Store key for an alert type's state.
pub fn alert_state_key(alert_type: &str) -> String {
    format!("alert:state:{alert_type}")
}

/// Persisted level of one alert type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertLevel {
    #[default]
    Normal,
    Alerting,
}

impl AlertLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Alerting => "ALERTING",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "NORMAL" => Some(Self::Normal),
            "ALERTING" => Some(Self::Alerting),
            _ => None,
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Alert,
    Recovery,
}

impl Transition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Recovery => "recovery",
        }
    }
}

/// What to watch and where the line is.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    /// e.g. `queue_length` or `failure_rate`.
    pub alert_type: String,
    /// Alert when the value goes strictly above this.
    pub threshold: f64,
}

impl AlertRule {
    pub fn new(alert_type: impl Into<String>, threshold: f64) -> Self {
        Self {
            alert_type: alert_type.into(),
            threshold,
        }
    }
}

/// NORMAL/ALERTING tracking for one alert type.
pub struct AlertStateMachine {
    store: Arc<dyn KeyValueStore>,
    rule: AlertRule,
    notifiers: Vec<Arc<dyn Notifier>>,
    state_ttl: Duration,
}

impl AlertStateMachine {
    pub fn new(store: Arc<dyn KeyValueStore>, rule: AlertRule, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            store,
            rule,
            notifiers,
            state_ttl: DEFAULT_ALERT_STATE_TTL,
        }
    }

    #[must_use]
    pub const fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn rule(&self) -> &AlertRule {
        &self.rule
    }

    fn key(&self) -> String {
        alert_state_key(&self.rule.alert_type)
    }

    /// Current persisted level. Absent, unreadable or unknown reads as NORMAL.
    pub async fn level(&self) -> AlertLevel {
        let key = self.key();
        match self.store.get(&key).await {
            Ok(Some(raw)) => AlertLevel::parse(&raw).unwrap_or_else(|| {
                warn!(key = %key, value = %raw, "Unknown alert state; treating as NORMAL");
                AlertLevel::Normal
            }),
            Ok(None) => AlertLevel::Normal,
            Err(e) => {
                warn!(key = %key, error = %e, "Alert state unreadable; treating as NORMAL");
                AlertLevel::Normal
            }
        }
    }

    /// Feed one sample. Returns the transition it caused, if any.
    pub async fn evaluate(&self, value: f64) -> Option<Transition> {
        let previous = self.level().await;
        let above = value > self.rule.threshold;
        debug!(
            alert_type = %self.rule.alert_type,
            value,
            threshold = self.rule.threshold,
            state = %previous,
            "Evaluating alert"
        );

        let transition = match (previous, above) {
            (AlertLevel::Normal, true) => Transition::Alert,
            (AlertLevel::Alerting, false) => Transition::Recovery,
            (AlertLevel::Alerting, true) => {
                self.refresh().await;
                return None;
            }
            (AlertLevel::Normal, false) => return None,
        };

        let (subject, body) = self.message(transition, value);
        info!(
            alert_type = %self.rule.alert_type,
            transition = transition.as_str(),
            value,
            "Alert state changed"
        );
        dispatch(&self.notifiers, &subject, &body).await;
        metrics::record_transition(&self.rule.alert_type, transition.as_str());

        let next = match transition {
            Transition::Alert => AlertLevel::Alerting,
            Transition::Recovery => AlertLevel::Normal,
        };
        self.persist(next).await;
        Some(transition)
    }

    async fn persist(&self, level: AlertLevel) {
        let key = self.key();
        if let Err(e) = self
            .store
            .set(&key, level.as_str().to_string(), Some(self.state_ttl))
            .await
        {
            warn!(key = %key, error = %e, "Failed to persist alert state");
        }
    }

    async fn refresh(&self) {
        let key = self.key();
        if let Err(e) = self.store.expire(&key, self.state_ttl).await {
            warn!(key = %key, error = %e, "Failed to refresh alert state");
        }
    }

    fn message(&self, transition: Transition, value: f64) -> (String, String) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        let alert_type = &self.rule.alert_type;
        let threshold = self.rule.threshold;
        match transition {
            Transition::Alert => (
                format!("[ALERT] {alert_type} above threshold"),
                format!("time: {now}, current value: {value}, threshold: {threshold}"),
            ),
            Transition::Recovery => (
                format!("[RECOVERED] {alert_type} back to normal"),
                format!("time: {now}, current value: {value}, threshold: {threshold}"),
            ),
        }
    }
}
