//! Cache-layer error types.
//!
//! None of these ever reach the client: store and strategy failures are
//! logged and the request proceeds as if uncached. Only [`ConfigError`] is
//! surfaced, at construction time.

use std::time::Duration;

use thiserror::Error;

/// A cache store failed for a reason other than a miss.
///
/// A miss is `Ok(None)` from [`CacheStore::get`](super::CacheStore::get), never
/// one of these variants.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cache record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// A key strategy could not derive a key for the request.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("cannot parse request URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("strategy rejected request: {0}")]
    Rejected(String),
}

/// The cache middleware was configured incorrectly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache strategy is required but was not configured")]
    MissingStrategy,
}
