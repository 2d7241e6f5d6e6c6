//! # rttp-cache
//!
//! Response caching middleware for the rttp pipeline, with request
//! coalescing: concurrent misses on the same key run the handler once.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use rttp_cache::cache::{CacheOptions, MemoryStore, ResponseCache};
//! use rttp_cache::middleware::{Next, endpoint};
//! use rttp_cache::{Context, Method, Request, Response, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = ResponseCache::by_request_path(
//!         MemoryStore::new(Duration::from_secs(60)),
//!         Duration::from_secs(5),
//!         CacheOptions::new().key_prefix("api:"),
//!     );
//!
//!     let stack = vec![
//!         cache.into_handler(),
//!         endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("Hello, World!") }),
//!     ];
//!
//!     let ctx = Context::new(Request::new(Method::Get, "/hello?lang=en"));
//!     let response = Next::new(stack).run(ctx).await;
//!     assert_eq!(response.body_ref(), b"Hello, World!");
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheOptions, CacheStatus, CacheStore, ResponseCache};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
