//! Application configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then validated. Every field has a default, so an empty file
//! (or none at all) is a working configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionflow_coordinator::{CoordinatorConfig, WorkerConfig};
use sessionflow_core::{Error, Result};
use sessionflow_monitor::SmtpSettings;
use sessionflow_store::{DEFAULT_QUEUE_NAME, PersistenceMode};
use sessionflow_workflow::EngineConfig;

/// Environment variable names that override file settings.
pub mod env {
    pub const QUEUE_ALERT_THRESHOLD: &str = "QUEUE_ALERT_THRESHOLD";
    pub const FAILURE_RATE_THRESHOLD: &str = "FAILURE_RATE_THRESHOLD";
    pub const JOB_INTERVAL_SECONDS: &str = "JOB_INTERVAL_SECONDS";
    pub const CLOUD_ALERT_WEBHOOK: &str = "CLOUD_ALERT_WEBHOOK";
    pub const CHAT_ALERT_WEBHOOK: &str = "CHAT_ALERT_WEBHOOK";
    pub const SMTP_SERVER: &str = "SMTP_SERVER";
    pub const SMTP_PORT: &str = "SMTP_PORT";
    pub const SMTP_USER: &str = "SMTP_USER";
    pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";
    pub const ALERT_EMAIL_LIST: &str = "ALERT_EMAIL_LIST";
    pub const METRICS_ADDR: &str = "METRICS_ADDR";
    pub const LOG: &str = "SESSIONFLOW_LOG";
}

/// Upper bound for every duration setting (one year). Larger values would
/// overflow the runtime clock.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Work queue name.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// State layout used by the worker.
    #[serde(default)]
    pub persistence_mode: PersistenceMode,

    /// Session state lifetime in seconds, refreshed on read.
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,

    /// Session lock expiry in seconds.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    /// How long a run waits for a held lock, in seconds.
    #[serde(default = "default_lock_wait")]
    pub lock_wait_secs: u64,

    /// Blocking dequeue timeout in seconds.
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout_secs: u64,

    /// Pause after an empty poll, in milliseconds.
    #[serde(default = "default_idle_sleep")]
    pub idle_sleep_ms: u64,

    /// Per-step time budget in seconds.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Extra attempts after a failed step.
    #[serde(default)]
    pub max_retries: u32,

    /// Alert when more than this many items wait in the queue.
    #[serde(default = "default_queue_alert_threshold")]
    pub queue_alert_threshold: u64,

    /// Alert when the failure rate goes above this (0.0 to 1.0).
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Number of recent step outcomes the failure rate is computed over.
    #[serde(default = "default_failure_window")]
    pub failure_window: usize,

    /// Alert monitor poll interval in seconds.
    #[serde(default = "default_job_interval")]
    pub job_interval_secs: u64,

    /// Lifetime of a persisted alert state in seconds.
    #[serde(default = "default_alert_state_ttl")]
    pub alert_state_ttl_secs: u64,

    /// Webhook receiving `{"subject", "body"}` JSON.
    #[serde(default)]
    pub cloud_alert_webhook: Option<String>,

    /// Chat-bot webhook receiving text messages.
    #[serde(default)]
    pub chat_alert_webhook: Option<String>,

    /// Email alerts; disabled while `smtp.server` is empty.
    #[serde(default)]
    pub smtp: SmtpSettings,

    /// Serve Prometheus metrics on this address when set.
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            queue_name: default_queue_name(),
            persistence_mode: PersistenceMode::default(),
            state_ttl_secs: default_state_ttl(),
            lock_ttl_secs: default_lock_ttl(),
            lock_wait_secs: default_lock_wait(),
            dequeue_timeout_secs: default_dequeue_timeout(),
            idle_sleep_ms: default_idle_sleep(),
            step_timeout_secs: default_step_timeout(),
            max_retries: 0,
            queue_alert_threshold: default_queue_alert_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            failure_window: default_failure_window(),
            job_interval_secs: default_job_interval(),
            alert_state_ttl_secs: default_alert_state_ttl(),
            cloud_alert_webhook: None,
            chat_alert_webhook: None,
            smtp: SmtpSettings::default(),
            metrics_addr: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then `path` if given, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an
    /// environment override is malformed, or the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::TomlParseFailed {
            reason: e.to_string(),
        })
    }

    /// Apply overrides from `lookup` (normally the process environment).
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric override does not parse.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(raw) = get(env::QUEUE_ALERT_THRESHOLD) {
            self.queue_alert_threshold = parse_env(env::QUEUE_ALERT_THRESHOLD, &raw)?;
        }
        if let Some(raw) = get(env::FAILURE_RATE_THRESHOLD) {
            self.failure_rate_threshold = parse_env(env::FAILURE_RATE_THRESHOLD, &raw)?;
        }
        if let Some(raw) = get(env::JOB_INTERVAL_SECONDS) {
            self.job_interval_secs = parse_env(env::JOB_INTERVAL_SECONDS, &raw)?;
        }
        if let Some(url) = get(env::CLOUD_ALERT_WEBHOOK) {
            self.cloud_alert_webhook = Some(url);
        }
        if let Some(url) = get(env::CHAT_ALERT_WEBHOOK) {
            self.chat_alert_webhook = Some(url);
        }
        if let Some(server) = get(env::SMTP_SERVER) {
            self.smtp.server = server;
        }
        if let Some(raw) = get(env::SMTP_PORT) {
            self.smtp.port = parse_env(env::SMTP_PORT, &raw)?;
        }
        if let Some(user) = get(env::SMTP_USER) {
            self.smtp.user = user;
        }
        if let Some(password) = get(env::SMTP_PASSWORD) {
            self.smtp.password = password;
        }
        if let Some(raw) = get(env::ALERT_EMAIL_LIST) {
            self.smtp.recipients = raw
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(raw) = get(env::METRICS_ADDR) {
            self.metrics_addr = Some(parse_env(env::METRICS_ADDR, &raw)?);
        }
        if let Some(level) = get(env::LOG) {
            self.log_level = level;
        }
        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.queue_name.trim().is_empty() {
            return Err(Error::config("queue_name must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(Error::config(
                "failure_rate_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.failure_window == 0 {
            return Err(Error::config("failure_window must be greater than 0"));
        }
        for (name, secs) in [
            ("job_interval_secs", self.job_interval_secs),
            ("lock_ttl_secs", self.lock_ttl_secs),
            ("state_ttl_secs", self.state_ttl_secs),
            ("step_timeout_secs", self.step_timeout_secs),
            ("alert_state_ttl_secs", self.alert_state_ttl_secs),
        ] {
            if secs == 0 {
                return Err(Error::config(format!("{name} must be greater than 0")));
            }
        }
        for (name, secs) in [
            ("job_interval_secs", self.job_interval_secs),
            ("lock_ttl_secs", self.lock_ttl_secs),
            ("lock_wait_secs", self.lock_wait_secs),
            ("state_ttl_secs", self.state_ttl_secs),
            ("step_timeout_secs", self.step_timeout_secs),
            ("alert_state_ttl_secs", self.alert_state_ttl_secs),
            ("dequeue_timeout_secs", self.dequeue_timeout_secs),
            ("idle_sleep_ms", self.idle_sleep_ms / 1000),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(Error::config(format!(
                    "{name} must not exceed {MAX_DURATION_SECS} seconds"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    #[must_use]
    pub const fn job_interval(&self) -> Duration {
        Duration::from_secs(self.job_interval_secs)
    }

    #[must_use]
    pub const fn alert_state_ttl(&self) -> Duration {
        Duration::from_secs(self.alert_state_ttl_secs)
    }

    #[must_use]
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_lock_ttl(Duration::from_secs(self.lock_ttl_secs))
            .with_lock_wait(Duration::from_secs(self.lock_wait_secs))
            .with_mode(self.persistence_mode)
    }

    #[must_use]
    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig::default()
            .with_dequeue_timeout(Duration::from_secs(self.dequeue_timeout_secs))
            .with_idle_sleep(Duration::from_millis(self.idle_sleep_ms))
            .with_mode(self.persistence_mode)
    }

    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_step_timeout(Duration::from_secs(self.step_timeout_secs))
            .with_max_retries(self.max_retries)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::config(format!("{name}={raw:?} is invalid: {e}")))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_name() -> String {
    DEFAULT_QUEUE_NAME.to_string()
}

fn default_state_ttl() -> u64 {
    24 * 60 * 60
}

fn default_lock_ttl() -> u64 {
    30
}

fn default_lock_wait() -> u64 {
    10
}

fn default_dequeue_timeout() -> u64 {
    10
}

fn default_idle_sleep() -> u64 {
    500
}

fn default_step_timeout() -> u64 {
    300
}

fn default_queue_alert_threshold() -> u64 {
    1000
}

fn default_failure_rate_threshold() -> f64 {
    0.1
}

fn default_failure_window() -> usize {
    100
}

fn default_job_interval() -> u64 {
    60
}

fn default_alert_state_ttl() -> u64 {
    60 * 60
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_alert_threshold, 1000);
        assert!((config.failure_rate_threshold - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.job_interval(), Duration::from_secs(60));
        assert_eq!(config.persistence_mode, PersistenceMode::Sharded);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(AppConfig::from_toml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_toml_overrides_fields() {
        let config = AppConfig::from_toml_str(
            r#"
            queue_name = "research"
            persistence_mode = "single"
            lock_wait_secs = 2
            chat_alert_webhook = "https://chat.example/hook"
            "#,
        )
        .unwrap();

        assert_eq!(config.queue_name, "research");
        assert_eq!(config.persistence_mode, PersistenceMode::Single);
        assert_eq!(config.coordinator().lock_wait, Duration::from_secs(2));
        assert_eq!(config.worker().mode, PersistenceMode::Single);
        assert_eq!(
            config.chat_alert_webhook.as_deref(),
            Some("https://chat.example/hook")
        );
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = AppConfig::from_toml_str("lock_ttl_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::TomlParseFailed { .. }));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = AppConfig::default()
            .with_env(lookup(&[
                ("QUEUE_ALERT_THRESHOLD", "25"),
                ("FAILURE_RATE_THRESHOLD", "0.3"),
                ("JOB_INTERVAL_SECONDS", "5"),
                ("CLOUD_ALERT_WEBHOOK", "https://ops.example/alerts"),
                ("SESSIONFLOW_LOG", "debug"),
                ("CHAT_ALERT_WEBHOOK", "  "),
            ]))
            .unwrap();

        assert_eq!(config.queue_alert_threshold, 25);
        assert!((config.failure_rate_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.job_interval_secs, 5);
        assert_eq!(
            config.cloud_alert_webhook.as_deref(),
            Some("https://ops.example/alerts")
        );
        assert_eq!(config.chat_alert_webhook, None);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_rejects_garbage_numbers() {
        let err = AppConfig::default()
            .with_env(lookup(&[("JOB_INTERVAL_SECONDS", "often")]))
            .unwrap_err();
        assert!(err.to_string().contains("JOB_INTERVAL_SECONDS"));
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            failure_rate_threshold: 1.5,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            job_interval_secs: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_caps_durations() {
        for config in [
            AppConfig {
                lock_ttl_secs: u64::MAX,
                ..AppConfig::default()
            },
            AppConfig {
                lock_wait_secs: MAX_DURATION_SECS + 1,
                ..AppConfig::default()
            },
            AppConfig {
                state_ttl_secs: u64::MAX,
                ..AppConfig::default()
            },
            AppConfig {
                alert_state_ttl_secs: u64::MAX,
                ..AppConfig::default()
            },
        ] {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("must not exceed"), "{err}");
        }

        let at_limit = AppConfig {
            state_ttl_secs: MAX_DURATION_SECS,
            ..AppConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_env_configures_email_and_metrics() {
        let config = AppConfig::default()
            .with_env(lookup(&[
                ("SMTP_SERVER", "smtp.example.com"),
                ("SMTP_PORT", "2525"),
                ("SMTP_USER", "alerts@example.com"),
                ("SMTP_PASSWORD", "secret"),
                ("ALERT_EMAIL_LIST", "ops@example.com, , dev@example.com"),
                ("METRICS_ADDR", "127.0.0.1:9000"),
            ]))
            .unwrap();

        assert!(config.smtp.is_complete());
        assert_eq!(config.smtp.port, 2525);
        assert_eq!(
            config.smtp.recipients,
            vec!["ops@example.com".to_string(), "dev@example.com".to_string()]
        );
        assert_eq!(config.metrics_addr, Some(SocketAddr::from(([127, 0, 0, 1], 9000))));
        assert!(AppConfig::default()
            .with_env(lookup(&[("METRICS_ADDR", "everywhere")]))
            .is_err());
    }

    #[test]
    fn test_smtp_table_in_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [smtp]
            server = "smtp.example.com"
            user = "alerts@example.com"
            "#,
        )
        .unwrap();

        assert!(config.smtp.is_enabled());
        assert!(!config.smtp.is_complete());
        assert_eq!(config.smtp.port, 587);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessionflow.toml");
        std::fs::write(&path, "failure_window = 20\nmax_retries = 2\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();

        assert_eq!(config.failure_window, 20);
        assert_eq!(config.engine().max_retries, 2);
        assert!(AppConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
