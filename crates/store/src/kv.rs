//! The key-value store seam every coordination component is built on.
//!
//! Implementations must make each method atomic with respect to every other
//! call on the same key. The lock manager, the queue and the alert state
//! machine rely on `set_nx`, `compare_and_delete` and the list operations
//! being indivisible.

use std::time::Duration;

use async_trait::async_trait;
use sessionflow_core::Result;
use tokio::sync::broadcast;

/// Trait for shared store backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value. Absent or expired keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, replacing whatever the key held.
    ///
    /// `ttl` of `None` stores the key without expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Write only if the key is absent. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: String, ttl: Duration) -> Result<bool>;

    /// Reset the expiry of an existing key. Returns `false` if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remaining time to live. `None` if the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Remove keys. Returns how many existed.
    async fn delete(&self, keys: &[&str]) -> Result<usize>;

    /// Delete `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Push onto the head of a list. Returns the new length.
    async fn lpush(&self, key: &str, value: String) -> Result<usize>;

    /// Pop from the tail of a list.
    async fn rpop(&self, key: &str) -> Result<Option<String>>;

    /// Pop from the tail, waiting up to `timeout` for an element.
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    /// Length of a list. Absent keys have length zero.
    async fn llen(&self, key: &str) -> Result<usize>;

    /// Broadcast a message. Returns how many subscribers received it.
    async fn publish(&self, channel: &str, message: String) -> Result<usize>;

    /// Subscribe to a channel. Only messages published afterwards are seen.
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>>;
}
