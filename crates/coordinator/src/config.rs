//! Coordinator and worker settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionflow_store::{DEFAULT_LOCK_TTL, DEFAULT_LOCK_WAIT, PersistenceMode};

/// How a coordinated run takes its lock and persists its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Lock expiry; bounds how long a crashed holder blocks the session.
    pub lock_ttl: Duration,
    /// How long to keep retrying a held lock before reporting busy.
    pub lock_wait: Duration,
    /// Default state layout.
    pub mode: PersistenceMode,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_wait: DEFAULT_LOCK_WAIT,
            mode: PersistenceMode::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Short waits so contention tests finish quickly.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            lock_ttl: Duration::from_secs(5),
            lock_wait: Duration::from_millis(100),
            mode: PersistenceMode::Sharded,
        }
    }

    #[must_use]
    pub const fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: PersistenceMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Queue worker pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Blocking dequeue timeout per poll.
    pub dequeue_timeout: Duration,
    /// Pause after an empty poll.
    pub idle_sleep: Duration,
    pub mode: PersistenceMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_secs(10),
            idle_sleep: Duration::from_millis(500),
            mode: PersistenceMode::default(),
        }
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            dequeue_timeout: Duration::from_millis(20),
            idle_sleep: Duration::from_millis(10),
            mode: PersistenceMode::Sharded,
        }
    }

    #[must_use]
    pub const fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: PersistenceMode) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lock_constants() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert_eq!(config.lock_wait, Duration::from_secs(10));
        assert_eq!(config.mode, PersistenceMode::Sharded);
    }

    #[test]
    fn test_builders() {
        let config = CoordinatorConfig::for_testing()
            .with_lock_wait(Duration::ZERO)
            .with_mode(PersistenceMode::Single);
        assert_eq!(config.lock_wait, Duration::ZERO);
        assert_eq!(config.mode, PersistenceMode::Single);

        let worker = WorkerConfig::default().with_idle_sleep(Duration::from_secs(1));
        assert_eq!(worker.idle_sleep, Duration::from_secs(1));
        assert_eq!(worker.dequeue_timeout, Duration::from_secs(10));
    }
}
