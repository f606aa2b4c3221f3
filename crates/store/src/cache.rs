//! Secondary cache for intermediate step results.
//!
//! Values live in the shared store under `cache:<key>` with a TTL. A small
//! in-process moka cache sits in front so repeated reads by the same worker
//! skip the store round trip.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sessionflow_core::Result;
use tracing::debug;

use crate::kv::KeyValueStore;

/// Default result TTL (1 hour).
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time to live in the shared store
    pub ttl: Duration,
    /// Maximum number of entries held in process; zero disables the local layer
    pub local_capacity: u64,
    /// Time to live in process
    pub local_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_RESULT_TTL,
            local_capacity: 1000,
            local_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Configuration without the in-process layer.
    #[must_use]
    pub fn store_only() -> Self {
        Self {
            local_capacity: 0,
            ..Self::default()
        }
    }
}

/// Two-level result cache.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    local: Option<Cache<String, Arc<Value>>>,
    ttl: Duration,
}

impl ResultCache {
    /// Cache with the default configuration.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, &CacheConfig::default())
    }

    /// Cache with a custom configuration.
    pub fn with_config(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        let local = (config.local_capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(config.local_capacity)
                .time_to_live(config.local_ttl.min(config.ttl))
                .build()
        });
        Self {
            store,
            local,
            ttl: config.ttl,
        }
    }

    fn store_key(key: &str) -> String {
        format!("cache:{key}")
    }

    /// Store a result under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or the store
    /// rejects the write.
    pub async fn cache_result<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store
            .set(&Self::store_key(key), value.to_string(), Some(self.ttl))
            .await?;
        if let Some(local) = &self.local {
            local.insert(key.to_string(), Arc::new(value)).await;
        }
        Ok(())
    }

    /// Read a cached result, `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable or the cached value does
    /// not decode as `T`.
    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(hit) = self.local_get(key).await {
            debug!(key, "Result cache hit (local)");
            return Ok(Some(serde_json::from_value(hit.as_ref().clone())?));
        }

        let Some(raw) = self.store.get(&Self::store_key(key)).await? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&raw)?;
        let decoded = serde_json::from_value(value.clone())?;
        if let Some(local) = &self.local {
            local.insert(key.to_string(), Arc::new(value)).await;
        }
        Ok(Some(decoded))
    }

    /// Drop a cached result from both layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        if let Some(local) = &self.local {
            local.invalidate(key).await;
        }
        self.store.delete(&[Self::store_key(key).as_str()]).await?;
        Ok(())
    }

    async fn local_get(&self, key: &str) -> Option<Arc<Value>> {
        match &self.local {
            Some(local) => local.get(key).await,
            None => None,
        }
    }
}
