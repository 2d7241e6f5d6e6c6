//! In-process TTL store backed by [`DashMap`].

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

use super::CacheStore;
use crate::cache::{error::StoreError, record::CacheRecord};

struct Entry {
    record: CacheRecord,
    // `None` never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Concurrent in-memory store with per-entry expiration.
///
/// Expired entries are dropped lazily when read, by [`purge_expired`](Self::purge_expired),
/// or periodically by a task started with [`spawn_sweeper`](Self::spawn_sweeper).
/// Deadlines use the tokio clock, so paused-time tests control expiry.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_cache::cache::{CacheRecord, CacheStore, MemoryStore};
/// use rttp_cache::{Response, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryStore::new(Duration::from_secs(60));
/// let record = CacheRecord::capture(&Response::new(StatusCode::Ok).body("hi"), true);
///
/// store.set("/hello", &record, Duration::from_secs(5)).await.unwrap();
/// assert_eq!(store.get("/hello").await.unwrap(), Some(record));
/// assert_eq!(store.get("/missing").await.unwrap(), None);
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    default_ttl: Duration,
}

impl MemoryStore {
    /// Creates a store whose entries default to `default_ttl`.
    ///
    /// A zero default means entries written without their own TTL never expire.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of entries held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Spawns a background task that purges expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits after the last clone of
    /// the store is dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries: Weak<DashMap<String, Entry>> = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("memory store dropped, sweeper exiting");
                    break;
                };
                let evicted = purge(&entries);
                if evicted > 0 {
                    debug!(evicted, "swept expired cache entries");
                }
            }
        })
    }

    // A TTL too large to represent as an instant never expires.
    fn deadline(&self, ttl: Duration) -> Option<Instant> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        if ttl.is_zero() {
            return None;
        }
        Instant::now().checked_add(ttl)
    }
}

fn purge(entries: &DashMap<String, Entry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.record.clone()));
            }
        } else {
            return Ok(None);
        }

        // The read guard is gone; re-check so a concurrent fresh write survives.
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, record: &CacheRecord, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            record: record.clone(),
            expires_at: self.deadline(ttl),
        };
        self.entries.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
