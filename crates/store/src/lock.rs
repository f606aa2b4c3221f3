//! Per-session mutual exclusion.
//!
//! A lock is a store key holding a random token, written with set-if-absent
//! and an expiry. Only the holder of the token can delete it, and a crashed
//! holder's lock disappears on its own once the TTL passes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sessionflow_core::SessionId;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::kv::KeyValueStore;

/// Default lock TTL (30 seconds).
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Default time to keep retrying acquisition (10 seconds).
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// Delay between acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Proof of lock ownership, required to release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a raw token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store key holding the lock for a session.
#[must_use]
pub fn lock_key(session_id: &SessionId) -> String {
    format!("lock:session:{session_id}")
}

/// Acquires and releases session locks.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
}

impl LockManager {
    /// Create a lock manager over a shared store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock, retrying every [`RETRY_INTERVAL`] until
    /// `max_wait` has elapsed.
    ///
    /// Returns `None` when the lock stayed held by someone else. Store errors
    /// count as a failed attempt.
    pub async fn acquire(
        &self,
        session_id: &SessionId,
        ttl: Duration,
        max_wait: Duration,
    ) -> Option<LockToken> {
        let key = lock_key(session_id);
        let token = LockToken::generate();
        let deadline = Instant::now().checked_add(max_wait);

        loop {
            match self.store.set_nx(&key, token.0.clone(), ttl).await {
                Ok(true) => {
                    debug!(session_id = %session_id, "Lock acquired");
                    return Some(token);
                }
                Ok(false) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "Lock attempt failed"),
            }

            let next_attempt = Instant::now().checked_add(RETRY_INTERVAL);
            if deadline.is_some_and(|deadline| next_attempt.is_none_or(|next| next > deadline)) {
                debug!(session_id = %session_id, "Lock wait exhausted");
                return None;
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    /// Release the lock if `token` still owns it.
    ///
    /// Returns `false` on token mismatch, an already-expired lock, or a store
    /// failure. Never errors.
    pub async fn release(&self, session_id: &SessionId, token: &LockToken) -> bool {
        match self
            .store
            .compare_and_delete(&lock_key(session_id), token.as_str())
            .await
        {
            Ok(released) => {
                if !released {
                    debug!(session_id = %session_id, "Lock no longer owned by token");
                }
                released
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Lock release failed");
                false
            }
        }
    }
}
