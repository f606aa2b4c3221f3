//! FIFO work queue decoupling submission from execution.
//!
//! Items are pushed on the head of a store list and popped from the tail.
//! There is no acknowledgment: once popped, an item is gone even if the
//! consumer crashes before finishing it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessionflow_core::{Error, Result, SessionId};
use tracing::{error, warn};

use crate::kv::KeyValueStore;

/// Default queue name.
pub const DEFAULT_QUEUE_NAME: &str = "session_tasks";

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub session_id: SessionId,
    pub topic: String,
}

impl QueueItem {
    fn validate(self) -> Result<Self> {
        if self.session_id.as_str().is_empty() {
            return Err(Error::invalid_record("queue item has empty session_id"));
        }
        if self.topic.trim().is_empty() {
            return Err(Error::invalid_record("queue item has empty topic"));
        }
        Ok(self)
    }
}

/// Whether a dequeue waits for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueMode {
    /// Wait up to the given duration.
    Blocking(Duration),
    NonBlocking,
}

/// A named FIFO queue in the shared store.
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl WorkQueue {
    /// Queue with the default name.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::named(store, DEFAULT_QUEUE_NAME)
    }

    /// Queue stored under `queue:<name>`.
    pub fn named(store: Arc<dyn KeyValueStore>, name: &str) -> Self {
        Self {
            store,
            key: format!("queue:{name}"),
        }
    }

    /// Store key backing this queue.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append an item to the tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the push.
    pub async fn enqueue(&self, session_id: &SessionId, topic: &str) -> Result<()> {
        let item = QueueItem {
            session_id: session_id.clone(),
            topic: topic.to_string(),
        };
        self.store
            .lpush(&self.key, serde_json::to_string(&item)?)
            .await?;
        Ok(())
    }

    /// Take the oldest item.
    ///
    /// Returns `None` on timeout, on an empty queue, on store failure, and on
    /// a malformed item (which is logged and discarded).
    pub async fn dequeue(&self, mode: DequeueMode) -> Option<QueueItem> {
        let popped = match mode {
            DequeueMode::Blocking(timeout) => self.store.brpop(&self.key, timeout).await,
            DequeueMode::NonBlocking => self.store.rpop(&self.key).await,
        };
        let raw = match popped {
            Ok(raw) => raw?,
            Err(e) => {
                error!(queue = %self.key, error = %e, "Dequeue failed");
                return None;
            }
        };

        match serde_json::from_str::<QueueItem>(&raw)
            .map_err(Error::from)
            .and_then(QueueItem::validate)
        {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(queue = %self.key, error = %e, raw = %raw, "Discarding malformed queue item");
                None
            }
        }
    }

    /// Number of waiting items, or `None` when the store is unavailable.
    pub async fn len(&self) -> Option<usize> {
        match self.store.llen(&self.key).await {
            Ok(len) => Some(len),
            Err(e) => {
                error!(queue = %self.key, error = %e, "Queue length unavailable");
                None
            }
        }
    }

    /// Whether the queue is known to be empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == Some(0)
    }
}
