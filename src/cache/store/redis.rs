//! Redis-backed store holding serialized [`CacheRecord`]s.

use std::{future::Future, time::Duration};

use ::redis::{
    AsyncCommands, Client,
    aio::{ConnectionLike, MultiplexedConnection},
};
use async_trait::async_trait;

use super::CacheStore;
use crate::cache::{error::StoreError, record::CacheRecord};

/// Remote store over an async Redis connection.
///
/// Generic over the connection so tests can substitute a scripted one; the
/// default is a [`MultiplexedConnection`] as opened by [`connect`](Self::connect).
/// Records are encoded with [`CacheRecord::to_bytes`]; a Redis nil reply is a
/// miss, exactly like an absent key in [`MemoryStore`](super::MemoryStore).
/// Cloning is cheap and shares the underlying connection.
///
/// ```no_run
/// use std::time::Duration;
/// use rttp_cache::cache::RedisStore;
///
/// # async fn connect() -> Result<(), rttp_cache::cache::StoreError> {
/// let store = RedisStore::connect("redis://127.0.0.1:6379")
///     .await?
///     .with_operation_timeout(Duration::from_secs(2));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore<C = MultiplexedConnection> {
    conn: C,
    operation_timeout: Option<Duration>,
}

impl RedisStore {
    /// Opens a multiplexed connection to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn))
    }
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wraps an already established connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            operation_timeout: None,
        }
    }

    /// Bounds every Redis round trip; an elapsed bound is [`StoreError::Timeout`].
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, ::redis::RedisError>>,
    {
        match self.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| StoreError::Timeout(limit))?
                .map_err(StoreError::from),
            None => op.await.map_err(StoreError::from),
        }
    }
}

#[async_trait]
impl<C> CacheStore for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let payload: Option<Vec<u8>> = self.bounded(conn.get::<_, Option<Vec<u8>>>(key)).await?;
        payload
            .map(|bytes| CacheRecord::from_bytes(&bytes))
            .transpose()
    }

    async fn set(&self, key: &str, record: &CacheRecord, ttl: Duration) -> Result<(), StoreError> {
        let payload = record.to_bytes()?;
        let mut conn = self.conn.clone();

        // PSETEX rejects zero, so a sub-millisecond TTL still gets one.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl.is_zero() {
            self.bounded(conn.set::<_, _, ()>(key, payload)).await
        } else {
            self.bounded(conn.pset_ex::<_, _, ()>(key, payload, millis.max(1)))
                .await
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _removed: i64 = self.bounded(conn.del::<_, i64>(key)).await?;
        Ok(())
    }
}
