//! Session state persistence, single-key or sharded.
//!
//! Sharded layout splits the two result groups away from the base fields so
//! the frequently-read base stays small:
//!
//! ```text
//! state:<id>            whole state (single-key mode)
//! state:<id>:base       everything except the result groups
//! state:<id>:group1     research_results
//! state:<id>:group2     code_results
//! ```
//!
//! The three sharded writes are independent store calls. A crash between
//! them leaves a base shard with stale or missing groups; readers default a
//! missing group to an empty map.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sessionflow_core::{Result, SessionId, SessionState};
use tracing::{debug, warn};

use crate::kv::KeyValueStore;

/// Default state time to live (24 hours).
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How a session's state is laid out in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    Single,
    #[default]
    Sharded,
}

struct ShardKeys {
    base: String,
    group1: String,
    group2: String,
}

impl ShardKeys {
    fn for_session(id: &SessionId) -> Self {
        Self {
            base: format!("state:{id}:base"),
            group1: format!("state:{id}:group1"),
            group2: format!("state:{id}:group2"),
        }
    }
}

fn single_key(id: &SessionId) -> String {
    format!("state:{id}")
}

/// Persists session state with TTL semantics.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl StateStore {
    /// Create a state store using the default TTL.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, DEFAULT_STATE_TTL)
    }

    /// Create a state store with a custom TTL.
    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// TTL applied on writes and refreshed on reads.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Write the whole state under one key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn set(&self, id: &SessionId, state: &SessionState, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(state)?;
        self.store.set(&single_key(id), payload, Some(ttl)).await
    }

    /// Read the whole state, refreshing its TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the stored JSON is corrupt.
    pub async fn get(&self, id: &SessionId) -> Result<Option<SessionState>> {
        let key = single_key(id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let state = serde_json::from_str(&raw)?;
        self.refresh(&key).await;
        Ok(Some(state))
    }

    /// Remove the single-key state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn delete(&self, id: &SessionId) -> Result<()> {
        self.store.delete(&[single_key(id).as_str()]).await?;
        Ok(())
    }

    /// Write the state as three shards sharing `ttl`.
    ///
    /// Missing result groups are written as empty maps.
    ///
    /// # Errors
    ///
    /// Returns an error on the first shard the store rejects; earlier shards
    /// stay written.
    pub async fn set_sharded(
        &self,
        id: &SessionId,
        state: &SessionState,
        ttl: Duration,
    ) -> Result<()> {
        let keys = ShardKeys::for_session(id);
        let mut base = state.clone();
        let group1 = base.research_results.take().unwrap_or_default();
        let group2 = base.code_results.take().unwrap_or_default();

        self.store
            .set(&keys.base, serde_json::to_string(&base)?, Some(ttl))
            .await?;
        self.store
            .set(&keys.group1, serde_json::to_string(&group1)?, Some(ttl))
            .await?;
        self.store
            .set(&keys.group2, serde_json::to_string(&group2)?, Some(ttl))
            .await?;
        debug!(session_id = %id, "Sharded state written");
        Ok(())
    }

    /// Read and combine the shards.
    ///
    /// Returns `None` when the base shard is absent. TTL is refreshed only on
    /// shards that exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or a shard is corrupt.
    pub async fn get_sharded(&self, id: &SessionId) -> Result<Option<SessionState>> {
        let keys = ShardKeys::for_session(id);
        let Some(raw_base) = self.store.get(&keys.base).await? else {
            return Ok(None);
        };
        let mut state: SessionState = serde_json::from_str(&raw_base)?;
        let raw_group1 = self.store.get(&keys.group1).await?;
        let raw_group2 = self.store.get(&keys.group2).await?;

        state.research_results = Some(decode_group(raw_group1.as_deref())?);
        state.code_results = Some(decode_group(raw_group2.as_deref())?);

        self.refresh(&keys.base).await;
        if raw_group1.is_some() {
            self.refresh(&keys.group1).await;
        }
        if raw_group2.is_some() {
            self.refresh(&keys.group2).await;
        }
        Ok(Some(state))
    }

    /// Remove all three shards. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn delete_sharded(&self, id: &SessionId) -> Result<()> {
        let keys = ShardKeys::for_session(id);
        self.store
            .delete(&[keys.base.as_str(), keys.group1.as_str(), keys.group2.as_str()])
            .await?;
        Ok(())
    }

    /// Read using the given layout.
    ///
    /// # Errors
    ///
    /// See [`Self::get`] and [`Self::get_sharded`].
    pub async fn load(&self, mode: PersistenceMode, id: &SessionId) -> Result<Option<SessionState>> {
        match mode {
            PersistenceMode::Single => self.get(id).await,
            PersistenceMode::Sharded => self.get_sharded(id).await,
        }
    }

    /// Write using the given layout and the configured TTL.
    ///
    /// # Errors
    ///
    /// See [`Self::set`] and [`Self::set_sharded`].
    pub async fn save(
        &self,
        mode: PersistenceMode,
        id: &SessionId,
        state: &SessionState,
    ) -> Result<()> {
        match mode {
            PersistenceMode::Single => self.set(id, state, self.ttl).await,
            PersistenceMode::Sharded => self.set_sharded(id, state, self.ttl).await,
        }
    }

    /// Delete using the given layout.
    ///
    /// # Errors
    ///
    /// See [`Self::delete`] and [`Self::delete_sharded`].
    pub async fn remove(&self, mode: PersistenceMode, id: &SessionId) -> Result<()> {
        match mode {
            PersistenceMode::Single => self.delete(id).await,
            PersistenceMode::Sharded => self.delete_sharded(id).await,
        }
    }

    async fn refresh(&self, key: &str) {
        if let Err(e) = self.store.expire(key, self.ttl).await {
            warn!(key, error = %e, "Failed to refresh state TTL");
        }
    }
}

fn decode_group(raw: Option<&str>) -> Result<Map<String, Value>> {
    raw.map_or_else(|| Ok(Map::new()), |raw| Ok(serde_json::from_str(raw)?))
}
