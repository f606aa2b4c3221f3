//! Store doubles for exercising failure paths.

use std::time::Duration;

use async_trait::async_trait;
use sessionflow_core::{Error, Result};
use tokio::sync::broadcast;

use crate::kv::KeyValueStore;

/// A store whose every operation fails as if the backend were down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableStore;

impl UnreachableStore {
    fn fail<T>() -> Result<T> {
        Err(Error::unavailable("connection refused"))
    }
}

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Self::fail()
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Option<Duration>) -> Result<()> {
        Self::fail()
    }

    async fn set_nx(&self, _key: &str, _value: String, _ttl: Duration) -> Result<bool> {
        Self::fail()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Self::fail()
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>> {
        Self::fail()
    }

    async fn delete(&self, _keys: &[&str]) -> Result<usize> {
        Self::fail()
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool> {
        Self::fail()
    }

    async fn lpush(&self, _key: &str, _value: String) -> Result<usize> {
        Self::fail()
    }

    async fn rpop(&self, _key: &str) -> Result<Option<String>> {
        Self::fail()
    }

    async fn brpop(&self, _key: &str, _timeout: Duration) -> Result<Option<String>> {
        Self::fail()
    }

    async fn llen(&self, _key: &str) -> Result<usize> {
        Self::fail()
    }

    async fn publish(&self, _channel: &str, _message: String) -> Result<usize> {
        Self::fail()
    }

    async fn subscribe(&self, _channel: &str) -> Result<broadcast::Receiver<String>> {
        Self::fail()
    }
}
