//! In-process store backend.
//!
//! Expiry is lazy: an expired key is dropped the next time anything touches
//! it. Time comes from `tokio::time`, so tests can pause and advance it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sessionflow_core::{Error, Result};
use tokio::sync::{Mutex, Notify, RwLock, broadcast};
use tokio::time::Instant;

use crate::kv::KeyValueStore;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
enum Value {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Deadline `ttl` from now; `None` when it lies beyond what `Instant` can
/// represent, which callers treat as "never".
fn deadline_after(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

#[derive(Debug, Default)]
struct Keyspace {
    slots: HashMap<String, Slot>,
}

impl Keyspace {
    /// Live slot for `key`, purging it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Slot> {
        let now = Instant::now();
        if self.slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::List(items),
                ..
            }) => Ok(Some(items)),
            Some(_) => Err(Error::wrong_type(key)),
        }
    }

    fn pop_tail(&mut self, key: &str) -> Result<Option<String>> {
        let Some(items) = self.list(key)? else {
            return Ok(None);
        };
        let popped = items.pop_back();
        if items.is_empty() {
            self.slots.remove(key);
        }
        Ok(popped)
    }
}

/// Store backend living entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    keyspace: Mutex<Keyspace>,
    pushed: Notify,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut keyspace = self.keyspace.lock().await;
        match keyspace.live(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(Error::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(deadline_after);
        self.keyspace.lock().await.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value),
                expires_at: deadline_after(ttl),
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut keyspace = self.keyspace.lock().await;
        let Some(slot) = keyspace.live(key) else {
            return Ok(false);
        };
        slot.expires_at = deadline_after(ttl);
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut keyspace = self.keyspace.lock().await;
        let now = Instant::now();
        Ok(keyspace
            .live(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn delete(&self, keys: &[&str]) -> Result<usize> {
        let mut keyspace = self.keyspace.lock().await;
        let mut removed = 0;
        for key in keys {
            if keyspace.live(key).is_some() {
                removed += 1;
            }
            keyspace.slots.remove(*key);
        }
        Ok(removed)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut keyspace = self.keyspace.lock().await;
        let matches = matches!(
            keyspace.live(key),
            Some(Slot { value: Value::Text(current), .. }) if current.as_str() == expected
        );
        if matches {
            keyspace.slots.remove(key);
        }
        Ok(matches)
    }

    async fn lpush(&self, key: &str, value: String) -> Result<usize> {
        let len = {
            let mut keyspace = self.keyspace.lock().await;
            if let Some(items) = keyspace.list(key)? {
                items.push_front(value);
                items.len()
            } else {
                keyspace.slots.insert(
                    key.to_string(),
                    Slot {
                        value: Value::List(VecDeque::from([value])),
                        expires_at: None,
                    },
                );
                1
            }
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.keyspace.lock().await.pop_tail(key)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = deadline_after(timeout);
        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.rpop(key).await? {
                return Ok(Some(item));
            }
            match deadline {
                Some(at) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<usize> {
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace.list(key)?.map_or(0, |items| items.len()))
    }

    async fn publish(&self, channel: &str, message: String) -> Result<usize> {
        {
            let channels = self.channels.read().await;
            match channels.get(channel) {
                None => return Ok(0),
                Some(sender) if sender.receiver_count() > 0 => {
                    return Ok(sender.send(message).unwrap_or(0));
                }
                Some(_) => {}
            }
        }
        // Every subscriber has gone away.
        let mut channels = self.channels.write().await;
        if channels
            .get(channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel);
        }
        Ok(0)
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>> {
        let mut channels = self.channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn open_channels(store: &InMemoryStore) -> usize {
        store.channels.read().await.len()
    }

    #[tokio::test]
    async fn test_return_none_for_missing_key() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_only_set_absent_keys_with_set_nx() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(5);

        assert!(store.set_nx("k", "a".into(), ttl).await.unwrap());
        assert!(!store.set_nx("k", "b".into(), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_keys_after_ttl() {
        let store = InMemoryStore::new();
        store
            .set("k", "v".into(), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.set_nx("k", "w".into(), Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_expiry() {
        let store = InMemoryStore::new();
        store
            .set("k", "v".into(), Some(Duration::from_secs(2)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(store.get("k").await.unwrap().is_some());
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_only_on_match() {
        let store = InMemoryStore::new();
        store.set("k", "mine".into(), None).await.unwrap();

        assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());
        assert!(store.compare_and_delete("k", "mine").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_deleted_keys() {
        let store = InMemoryStore::new();
        store.set("a", "1".into(), None).await.unwrap();
        store.set("b", "2".into(), None).await.unwrap();

        assert_eq!(store.delete(&["a", "b", "c"]).await.unwrap(), 2);
        assert_eq!(store.delete(&["a"]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_in_push_order() {
        let store = InMemoryStore::new();
        store.lpush("q", "1".into()).await.unwrap();
        store.lpush("q", "2".into()).await.unwrap();

        assert_eq!(store.llen("q").await.unwrap(), 2);
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.rpop("q").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.rpop("q").await.unwrap(), None);
        assert_eq!(store.llen("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reject_list_ops_on_text_keys() {
        let store = InMemoryStore::new();
        store.set("k", "v".into(), None).await.unwrap();

        assert!(matches!(
            store.lpush("k", "x".into()).await,
            Err(Error::WrongType { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_out_blocking_pop_on_empty_list() {
        let store = InMemoryStore::new();
        let popped = store.brpop("q", Duration::from_secs(3)).await.unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn test_wake_blocking_pop_on_push() {
        let store = InMemoryStore::new_arc();
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.brpop("q", Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        store.lpush("q", "job".into()).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("job"));
    }

    #[tokio::test]
    async fn test_deliver_published_messages_to_subscribers() {
        let store = InMemoryStore::new();
        assert_eq!(store.publish("ch", "lost".into()).await.unwrap(), 0);

        let mut rx = store.subscribe("ch").await.unwrap();
        assert_eq!(store.publish("ch", "hello".into()).await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_forgets_channels_without_subscribers() {
        let store = InMemoryStore::new();
        for i in 0..100 {
            drop(store.subscribe(&format!("channel:session:{i}")).await.unwrap());
        }

        let _live = store.subscribe("channel:session:live").await.unwrap();
        assert_eq!(open_channels(&store).await, 1);

        drop(store.subscribe("channel:session:gone").await.unwrap());
        assert_eq!(store.publish("channel:session:gone", "x".into()).await.unwrap(), 0);
        assert_eq!(open_channels(&store).await, 1);
    }

    #[tokio::test]
    async fn test_oversized_ttl_never_expires() {
        let store = InMemoryStore::new();
        let forever = Duration::from_secs(u64::MAX);

        assert!(store.set_nx("k", "v".into(), forever).await.unwrap());
        store.set("s", "v".into(), Some(forever)).await.unwrap();
        assert!(store.expire("s", forever).await.unwrap());

        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert_eq!(store.get("s").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_blocking_pop_with_oversized_timeout_returns_pushed_item() {
        let store = InMemoryStore::new();
        store.lpush("q", "job".into()).await.unwrap();

        let popped = store.brpop("q", Duration::from_secs(u64::MAX)).await.unwrap();
        assert_eq!(popped.as_deref(), Some("job"));
    }
}
