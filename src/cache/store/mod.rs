//! Cache store contract and its two backends.
//!
//! - [`MemoryStore`] — in-process expiring map.
//! - [`RedisStore`] — remote Redis instance holding serialized records.
//!
//! The middleware treats every store as an opaque, thread-safe service and
//! never locks around it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{error::StoreError, record::CacheRecord};

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// Storage backend for cached responses.
///
/// A miss (no entry, or an expired one) is `Ok(None)`; `Err` is reserved for
/// real failures. Dropping a returned future cancels the operation.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Looks up `key`.
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, StoreError>;

    /// Stores `record` under `key` for `ttl`.
    ///
    /// A zero `ttl` means the entry carries no TTL of its own; see each backend
    /// for what that implies.
    async fn set(&self, key: &str, record: &CacheRecord, ttl: Duration) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, record: &CacheRecord, ttl: Duration) -> Result<(), StoreError> {
        (**self).set(key, record, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}
