//! Response caching with request coalescing.
//!
//! [`ResponseCache`] is a [`Middleware`](crate::middleware::Middleware) that
//! stores successful responses in a [`CacheStore`] under a key chosen by a
//! [`KeyStrategy`], replays them on later requests, and makes concurrent
//! misses on the same key share a single downstream call.
//!
//! ## Stores
//!
//! - [`MemoryStore`] — in-process map with per-entry TTL.
//! - [`RedisStore`] — records serialized as JSON in Redis.
//!
//! Any other backend implements [`CacheStore`]; a miss is `Ok(None)`.
//!
//! ## Keys
//!
//! [`RequestUri`], [`SortedQueryUri`] and [`RequestPath`] cover the usual
//! cases. A closure returning a [`Decision`] can opt requests out, or send
//! them to another store with another TTL.

mod error;
mod flight;
mod middleware;
mod options;
mod record;
pub mod store;
mod strategy;

pub use error::{ConfigError, StoreError, StrategyError};
pub use middleware::{CacheStatus, ResponseCache};
pub use options::{BeforeReplyHook, CacheHook, CacheOptions};
pub use record::CacheRecord;
pub use store::{CacheStore, MemoryStore, RedisStore};
pub use strategy::{Decision, KeyStrategy, RequestPath, RequestUri, SortedQueryUri, sort_query};
