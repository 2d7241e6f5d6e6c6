//! Configuration for [`ResponseCache`](super::ResponseCache).

use std::{fmt, sync::Arc, time::Duration};

use super::{record::CacheRecord, strategy::KeyStrategy};
use crate::context::Context;

/// Callback run inline with a request at a cache event.
pub type CacheHook = Arc<dyn Fn(&Context) + Send + Sync + 'static>;

/// Callback run with the record about to be replayed.
pub type BeforeReplyHook = Arc<dyn Fn(&Context, &CacheRecord) + Send + Sync + 'static>;

/// Options for the response cache middleware, built fluently.
///
/// Every hook defaults to a no-op. Hooks run synchronously in the request's
/// own task, so they must not block.
///
/// | Option                         | Default      |
/// |--------------------------------|--------------|
/// | `strategy`                     | none         |
/// | `on_hit` / `on_miss`           | no-op        |
/// | `before_reply`                 | no-op        |
/// | `on_share_single_flight`       | no-op        |
/// | `single_flight_forget_timeout` | disabled     |
/// | `ignore_query_order`           | `false`      |
/// | `key_prefix`                   | `""`         |
/// | `without_header`               | `false`      |
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use std::time::Duration;
/// use rttp_cache::cache::{CacheOptions, RequestPath};
///
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
///
/// let options = CacheOptions::new()
///     .strategy(RequestPath)
///     .key_prefix("v1:")
///     .single_flight_forget_timeout(Duration::from_millis(500))
///     .on_hit(move |_ctx| {
///         counter.fetch_add(1, Ordering::Relaxed);
///     });
/// # let _ = options;
/// ```
#[derive(Clone)]
pub struct CacheOptions {
    pub(crate) strategy: Option<Arc<dyn KeyStrategy>>,
    pub(crate) on_hit: CacheHook,
    pub(crate) on_miss: CacheHook,
    pub(crate) before_reply: BeforeReplyHook,
    pub(crate) on_share_single_flight: CacheHook,
    pub(crate) single_flight_forget_timeout: Option<Duration>,
    pub(crate) ignore_query_order: bool,
    pub(crate) key_prefix: String,
    pub(crate) without_header: bool,
}

fn noop_hook() -> CacheHook {
    Arc::new(|_: &Context| {})
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            strategy: None,
            on_hit: noop_hook(),
            on_miss: noop_hook(),
            before_reply: Arc::new(|_: &Context, _: &CacheRecord| {}),
            on_share_single_flight: noop_hook(),
            single_flight_forget_timeout: None,
            ignore_query_order: false,
            key_prefix: String::new(),
            without_header: false,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how requests map to cache keys.
    #[must_use]
    pub fn strategy(mut self, strategy: impl KeyStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Called after a response is served from the store.
    #[must_use]
    pub fn on_hit(mut self, hook: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.on_hit = Arc::new(hook);
        self
    }

    /// Called when the store has no usable entry, before coalescing.
    #[must_use]
    pub fn on_miss(mut self, hook: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.on_miss = Arc::new(hook);
        self
    }

    /// Called with the record right before it is replayed, for store hits and
    /// coalesced followers alike.
    #[must_use]
    pub fn before_reply(
        mut self,
        hook: impl Fn(&Context, &CacheRecord) + Send + Sync + 'static,
    ) -> Self {
        self.before_reply = Arc::new(hook);
        self
    }

    /// Called when a request was answered with another request's in-flight result.
    #[must_use]
    pub fn on_share_single_flight(mut self, hook: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.on_share_single_flight = Arc::new(hook);
        self
    }

    /// After `timeout`, new arrivals stop waiting on a running backend call
    /// for the same key and start their own. Zero disables the timeout.
    #[must_use]
    pub fn single_flight_forget_timeout(mut self, timeout: Duration) -> Self {
        self.single_flight_forget_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Sort query parameters when keying by URI. Only read by
    /// [`ResponseCache::by_request_uri`](super::ResponseCache::by_request_uri).
    #[must_use]
    pub fn ignore_query_order(mut self, ignore: bool) -> Self {
        self.ignore_query_order = ignore;
        self
    }

    /// Prepended to every strategy key.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Cache and replay only status and body.
    #[must_use]
    pub fn without_header(mut self, without: bool) -> Self {
        self.without_header = without;
        self
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("strategy", &self.strategy.as_ref().map(|_| "<strategy>"))
            .field(
                "single_flight_forget_timeout",
                &self.single_flight_forget_timeout,
            )
            .field("ignore_query_order", &self.ignore_query_order)
            .field("key_prefix", &self.key_prefix)
            .field("without_header", &self.without_header)
            .finish_non_exhaustive()
    }
}
