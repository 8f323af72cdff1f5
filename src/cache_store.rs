use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// This is the backend-facing interface of the session factory.
/// It defines the three operations the factory needs from a key/value cache with expiry.
///
/// Each operation is expected to be atomic for its key. No ordering between keys is required.
/// Errors are reported to the caller of the factory as [`Error::CacheUnavailable`](crate::Error::CacheUnavailable).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the value stored under `key`.
    /// Returns `Ok(None)` if there is no value, or if it has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value. The value expires after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Delete the value stored under `key`, if any.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<Store: CacheStore + ?Sized> CacheStore for Arc<Store> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        (**self).set_with_expiry(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}
