//! The response cache middleware.
//!
//! [`ResponseCache`] sits in the middleware chain in front of an expensive
//! handler. Per request it asks its [`KeyStrategy`] for a key, serves a stored
//! record when there is one, and otherwise lets exactly one request per key run
//! the rest of the chain while concurrent requests for the same key wait for
//! that result.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{debug, error, warn};

use super::{
    error::ConfigError,
    flight::{FlightGroup, Role},
    options::{CacheHook, CacheOptions},
    record::CacheRecord,
    store::CacheStore,
    strategy::{Decision, KeyStrategy, RequestPath, RequestUri, SortedQueryUri},
};
use crate::{
    Response,
    context::Context,
    middleware::{BoxResponseFuture, Middleware, MiddlewareHandler, Next, from_middleware},
};

/// How the cache handled a request, stored in the request's
/// [`Extensions`](crate::context::Extensions).
///
/// Set before any callback runs, so hooks and downstream stages can read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Not in the store; this request runs the chain (or waits for one that does).
    Miss,
    /// Answered with another concurrent request's result.
    Shared,
    /// The strategy declined to cache this request.
    Bypass,
}

/// Coalescing response cache, usable as a [`Middleware`].
///
/// Cloning is cheap; clones share configuration and the in-flight registry.
/// Separate `ResponseCache` values never coalesce with each other, even over
/// the same store.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_cache::cache::{CacheOptions, MemoryStore, ResponseCache};
/// use rttp_cache::middleware::{Next, endpoint};
/// use rttp_cache::{Context, Method, Request, Response, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = ResponseCache::by_request_uri(
///     MemoryStore::new(Duration::from_secs(60)),
///     Duration::from_secs(30),
///     CacheOptions::new().ignore_query_order(true),
/// );
///
/// let stack = vec![
///     cache.into_handler(),
///     endpoint(|_ctx| async { Response::new(StatusCode::Ok).body("expensive") }),
/// ];
///
/// let ctx = Context::new(Request::new(Method::Get, "/report?b=2&a=1"));
/// let response = Next::new(stack).run(ctx).await;
/// assert_eq!(response.body_ref(), b"expensive");
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    strategy: Arc<dyn KeyStrategy>,
    options: CacheOptions,
    flights: FlightGroup,
}

impl ResponseCache {
    /// Builds a cache over `store` with entries living `ttl` by default.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingStrategy`] if `options` carries no strategy.
    pub fn new(
        store: impl CacheStore + 'static,
        ttl: Duration,
        options: CacheOptions,
    ) -> Result<Self, ConfigError> {
        let strategy = options
            .strategy
            .clone()
            .ok_or(ConfigError::MissingStrategy)?;
        Ok(Self::build(Arc::new(store), ttl, strategy, options))
    }

    /// Keys every request by its URI.
    ///
    /// With [`CacheOptions::ignore_query_order`] set, query parameters are
    /// sorted first, so `?a=1&b=2` and `?b=2&a=1` share an entry. Any strategy
    /// already in `options` is replaced.
    pub fn by_request_uri(
        store: impl CacheStore + 'static,
        ttl: Duration,
        options: CacheOptions,
    ) -> Self {
        let strategy: Arc<dyn KeyStrategy> = if options.ignore_query_order {
            Arc::new(SortedQueryUri)
        } else {
            Arc::new(RequestUri)
        };
        Self::build(Arc::new(store), ttl, strategy, options)
    }

    /// Keys every request by its path, ignoring the query string.
    ///
    /// Any strategy already in `options` is replaced.
    pub fn by_request_path(
        store: impl CacheStore + 'static,
        ttl: Duration,
        options: CacheOptions,
    ) -> Self {
        Self::build(Arc::new(store), ttl, Arc::new(RequestPath), options)
    }

    /// Wraps the cache for use in a middleware stack.
    pub fn into_handler(self) -> MiddlewareHandler {
        from_middleware(Arc::new(self))
    }

    /// TTL used when a [`Decision`] does not override it.
    pub fn default_ttl(&self) -> Duration {
        self.inner.ttl
    }

    fn build(
        store: Arc<dyn CacheStore>,
        ttl: Duration,
        strategy: Arc<dyn KeyStrategy>,
        options: CacheOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                ttl,
                strategy,
                options,
                flights: FlightGroup::new(),
            }),
        }
    }
}

impl Middleware for ResponseCache {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponseFuture {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.serve(ctx, next).await })
    }
}

impl Inner {
    async fn serve(&self, mut ctx: Context, next: Next) -> Response {
        let decision = match self.strategy.decide(&ctx) {
            Ok(decision) => decision,
            Err(error) => {
                let uri = ctx.request().uri();
                warn!(%error, uri, "cache strategy failed, keying by raw URI");
                Decision::cache(uri)
            }
        };

        if !decision.should_cache {
            ctx.extensions_mut().insert(CacheStatus::Bypass);
            return next.run(ctx).await;
        }

        let key = format!("{}{}", self.options.key_prefix, decision.key);
        let store = decision.store.unwrap_or_else(|| Arc::clone(&self.store));
        let ttl = decision
            .ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.ttl);

        match store.get(&key).await {
            Ok(Some(record)) => {
                debug!(%key, "cache hit");
                return self.reply(&mut ctx, CacheStatus::Hit, &record, &self.options.on_hit);
            }
            Ok(None) => {}
            Err(error) => error!(%key, %error, "cache read failed, treating as miss"),
        }

        debug!(%key, "cache miss");
        ctx.extensions_mut().insert(CacheStatus::Miss);
        (self.options.on_miss)(&ctx);

        loop {
            match self
                .flights
                .join(&key, self.options.single_flight_forget_timeout)
            {
                Role::Leader(leader) => {
                    let response = next.run(ctx).await;
                    let record = Arc::new(CacheRecord::capture(
                        &response,
                        !self.options.without_header,
                    ));

                    if record.is_cacheable() {
                        if let Err(error) = store.set(&key, &record, ttl).await {
                            warn!(%key, %error, "cache write failed");
                        }
                    } else {
                        debug!(%key, status = record.status().as_u16(), "response not cacheable");
                    }

                    leader.complete(record);
                    return response;
                }
                Role::Follower(follower) => match follower.wait().await {
                    Some(record) => {
                        debug!(%key, "served in-flight response");
                        return self.reply(
                            &mut ctx,
                            CacheStatus::Shared,
                            &record,
                            &self.options.on_share_single_flight,
                        );
                    }
                    None => debug!(%key, "in-flight request abandoned, retrying"),
                },
            }
        }
    }

    fn reply(
        &self,
        ctx: &mut Context,
        status: CacheStatus,
        record: &CacheRecord,
        hook: &CacheHook,
    ) -> Response {
        ctx.extensions_mut().insert(status);
        let ctx = &*ctx;
        (self.options.before_reply)(ctx, record);
        let response = record.replay(!self.options.without_header);
        hook(ctx);
        response
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.inner.ttl)
            .field("options", &self.inner.options)
            .field("in_flight", &self.inner.flights.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        Method, Request, StatusCode,
        cache::{MemoryStore, StoreError, StrategyError},
        middleware::endpoint,
    };

    fn get(uri: &str) -> Context {
        Context::new(Request::new(Method::Get, uri))
    }

    fn memory() -> MemoryStore {
        MemoryStore::new(Duration::from_secs(60))
    }

    /// Echoes the request URI and counts how often it runs.
    fn backend(calls: &Arc<AtomicUsize>) -> MiddlewareHandler {
        slow_backend(calls, Duration::ZERO)
    }

    fn slow_backend(calls: &Arc<AtomicUsize>, delay: Duration) -> MiddlewareHandler {
        let calls = Arc::clone(calls);
        endpoint(move |ctx: Context| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Response::new(StatusCode::Ok).body(ctx.request().uri().to_owned())
            }
        })
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Context) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, move |_: &Context| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn call(cache: &ResponseCache, backend: &MiddlewareHandler, uri: &str) -> Response {
        let stack = vec![cache.clone().into_handler(), Arc::clone(backend)];
        Next::new(stack).run(get(uri)).await
    }

    #[test]
    fn missing_strategy_is_rejected() {
        let result = ResponseCache::new(memory(), Duration::from_secs(1), CacheOptions::new());
        assert!(matches!(result, Err(ConfigError::MissingStrategy)));
    }

    #[test]
    fn constructors_keep_the_default_ttl() {
        let ttl = Duration::from_secs(7);
        let by_uri = ResponseCache::by_request_uri(memory(), ttl, CacheOptions::new());
        let by_path = ResponseCache::by_request_path(memory(), ttl, CacheOptions::new());
        assert_eq!(by_uri.default_ttl(), ttl);
        assert_eq!(by_path.default_ttl(), ttl);
    }

    #[tokio::test]
    async fn unbounded_ttl_is_stored_and_served() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ResponseCache::by_request_path(memory(), Duration::MAX, CacheOptions::new());
        let backend = backend(&calls);

        let first = call(&cache, &backend, "/forever").await;
        let second = call(&cache, &backend, "/forever").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.body_ref(), first.body_ref());
    }

    #[tokio::test]
    async fn path_strategy_hits_across_query_strings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (hits, on_hit) = counter();
        let (misses, on_miss) = counter();
        let options = CacheOptions::new().on_hit(on_hit).on_miss(on_miss);
        let cache = ResponseCache::by_request_path(memory(), Duration::from_secs(3), options);
        let backend = backend(&calls);

        let first = call(&cache, &backend, "/x?uid=1").await;
        let second = call(&cache, &backend, "/x?uid=2").await;
        let third = call(&cache, &backend, "/x?uid=3").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(first.body_ref(), b"/x?uid=1");
        assert_eq!(second.body_ref(), b"/x?uid=1");
        assert_eq!(third.body_ref(), b"/x?uid=1");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_default_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ResponseCache::by_request_path(memory(), Duration::from_secs(3), CacheOptions::new());
        let backend = backend(&calls);

        call(&cache, &backend, "/x?uid=1").await;
        tokio::time::advance(Duration::from_secs(2)).await;
        let cached = call(&cache, &backend, "/x?uid=2").await;
        assert_eq!(cached.body_ref(), b"/x?uid=1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let fresh = call(&cache, &backend, "/x?uid=3").await;
        assert_eq!(fresh.body_ref(), b"/x?uid=3");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn uri_strategy_keeps_queries_apart() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ResponseCache::by_request_uri(memory(), Duration::from_secs(3), CacheOptions::new());
        let backend = backend(&calls);

        call(&cache, &backend, "/x?uid=1").await;
        call(&cache, &backend, "/x?uid=2").await;
        call(&cache, &backend, "/x?uid=1").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_order_matters_unless_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);

        let strict = ResponseCache::by_request_uri(memory(), Duration::from_secs(3), CacheOptions::new());
        call(&strict, &backend, "/p?b=2&a=1").await;
        call(&strict, &backend, "/p?a=1&b=2").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let store = memory();
        let sorted = ResponseCache::by_request_uri(
            store.clone(),
            Duration::from_secs(3),
            CacheOptions::new().ignore_query_order(true),
        );
        call(&sorted, &backend, "/p?b=2&a=1").await;
        let second = call(&sorted, &backend, "/p?a=1&b=2").await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(second.body_ref(), b"/p?b=2&a=1");
        assert!(store.get("/p?a=1&b=2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn only_success_statuses_are_stored() {
        let store = memory();
        let cache = ResponseCache::by_request_path(store.clone(), Duration::from_secs(3), CacheOptions::new());
        let backend = endpoint(|ctx: Context| async move {
            let code: u16 = ctx
                .request()
                .path()
                .trim_start_matches("/status/")
                .parse()
                .unwrap_or(500);
            Response::new(StatusCode::try_from(code).unwrap_or(StatusCode::InternalServerError))
        });

        for (code, stored) in [(200, true), (204, true), (301, false), (404, false), (500, false)] {
            let path = format!("/status/{code}");
            let response = call(&cache, &backend, &path).await;
            assert_eq!(response.status().as_u16(), code);
            assert_eq!(store.get(&path).await.unwrap().is_some(), stored, "status {code}");
        }
    }

    #[tokio::test]
    async fn error_response_passes_through_each_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let backend = endpoint(move |_ctx: Context| {
            let calls = Arc::clone(&counted);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Response::new(StatusCode::BadGateway).body("upstream down")
            }
        });
        let cache = ResponseCache::by_request_path(memory(), Duration::from_secs(3), CacheOptions::new());

        for _ in 0..3 {
            let response = call(&cache, &backend, "/flaky").await;
            assert_eq!(response.status(), StatusCode::BadGateway);
            assert_eq!(response.body_ref(), b"upstream down");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hit_replays_every_header_value() {
        let backend = endpoint(|_ctx: Context| async {
            Response::new(StatusCode::Created)
                .header("X-A", "1")
                .header("X-A", "2")
                .header("Content-Type", "text/plain")
                .body_bytes(vec![0, 1, 2])
        });
        let cache = ResponseCache::by_request_path(memory(), Duration::from_secs(3), CacheOptions::new());

        call(&cache, &backend, "/h").await;
        let hit = call(&cache, &backend, "/h").await;

        assert_eq!(hit.status(), StatusCode::Created);
        assert_eq!(hit.headers().get_all("X-A").collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(hit.headers().get("Content-Type"), Some("text/plain"));
        assert_eq!(hit.body_ref(), &[0, 1, 2]);
    }

    #[tokio::test]
    async fn without_header_drops_headers_on_replay() {
        let backend = endpoint(|_ctx: Context| async {
            Response::new(StatusCode::Ok).header("X-A", "1").body("b")
        });
        let store = memory();
        let cache = ResponseCache::by_request_path(
            store.clone(),
            Duration::from_secs(3),
            CacheOptions::new().without_header(true),
        );

        let live = call(&cache, &backend, "/h").await;
        assert_eq!(live.headers().get("X-A"), Some("1"));

        let hit = call(&cache, &backend, "/h").await;
        assert!(hit.headers().is_empty());
        assert_eq!(hit.body_ref(), b"b");
        assert!(store.get("/h").await.unwrap().unwrap().headers().is_empty());
    }

    #[tokio::test]
    async fn prefixes_isolate_engines_sharing_a_store() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let store = memory();
        let a = ResponseCache::by_request_uri(store.clone(), Duration::from_secs(3), CacheOptions::new().key_prefix("a:"));
        let b = ResponseCache::by_request_uri(store.clone(), Duration::from_secs(3), CacheOptions::new().key_prefix("b:"));

        call(&a, &backend, "/p").await;
        call(&b, &backend, "/p").await;
        call(&a, &backend, "/p").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.get("a:/p").await.unwrap().is_some());
        assert!(store.get("b:/p").await.unwrap().is_some());
        assert!(store.get("/p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_prefixed_key_forces_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let store = memory();
        let cache = ResponseCache::by_request_uri(
            store.clone(),
            Duration::from_secs(3),
            CacheOptions::new().key_prefix("#prefix#"),
        );

        call(&cache, &backend, "/p").await;
        store.delete("#prefix#/p").await.unwrap();
        call(&cache, &backend, "/p").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_backend_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (shared, on_share) = counter();
        let (misses, on_miss) = counter();
        let (replies, before_reply) = {
            let (count, hook) = counter();
            (count, move |ctx: &Context, _: &CacheRecord| hook(ctx))
        };
        let cache = ResponseCache::by_request_uri(
            memory(),
            Duration::from_secs(60),
            CacheOptions::new()
                .on_share_single_flight(on_share)
                .on_miss(on_miss)
                .before_reply(before_reply),
        );
        let stack = vec![cache.into_handler(), slow_backend(&calls, Duration::from_millis(100))];

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stack = stack.clone();
                tokio::spawn(async move { Next::new(stack).run(get("/same")).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().body_ref(), b"/same");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses.load(Ordering::SeqCst), 10);
        assert_eq!(shared.load(Ordering::SeqCst), 9);
        assert_eq!(replies.load(Ordering::SeqCst), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn thousand_requests_over_five_keys_run_backend_five_times() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ResponseCache::by_request_uri(memory(), Duration::from_secs(60), CacheOptions::new());
        let stack = vec![cache.into_handler(), slow_backend(&calls, Duration::from_millis(100))];

        let handles: Vec<_> = (0..1000)
            .map(|i| {
                let stack = stack.clone();
                let uri = format!("/item/{}", i % 5);
                tokio::spawn(async move { Next::new(stack).run(get(&uri)).await })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let response = handle.await.unwrap();
            assert_eq!(response.body_ref(), format!("/item/{}", i % 5).as_bytes());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn forget_timeout_lets_late_arrivals_lead() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (shared, on_share) = counter();
        let counted = Arc::clone(&calls);
        let backend = endpoint(move |_ctx: Context| {
            let calls = Arc::clone(&counted);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_secs(3)).await;
                Response::new(StatusCode::Ok).body(format!("call {n}"))
            }
        });
        let cache = ResponseCache::by_request_path(
            memory(),
            Duration::from_secs(60),
            CacheOptions::new()
                .single_flight_forget_timeout(Duration::from_secs(1))
                .on_share_single_flight(on_share),
        );
        let stack = vec![cache.into_handler(), backend];
        let spawn = |stack: Vec<MiddlewareHandler>| {
            tokio::spawn(async move { Next::new(stack).run(get("/slow")).await })
        };

        let first = spawn(stack.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        let early = spawn(stack.clone());
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let late = spawn(stack.clone());

        assert_eq!(first.await.unwrap().body_ref(), b"call 1");
        assert_eq!(early.await.unwrap().body_ref(), b"call 1");
        assert_eq!(late.await.unwrap().body_ref(), b"call 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(shared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn follower_takes_over_when_leader_is_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let backend = endpoint(move |_ctx: Context| {
            let calls = Arc::clone(&counted);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Response::new(StatusCode::Ok).body(format!("call {n}"))
            }
        });
        let cache = ResponseCache::by_request_path(memory(), Duration::from_secs(60), CacheOptions::new());
        let stack = vec![cache.into_handler(), backend];

        let leader = {
            let stack = stack.clone();
            tokio::spawn(async move { Next::new(stack).run(get("/k")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = {
            let stack = stack.clone();
            tokio::spawn(async move { Next::new(stack).run(get("/k")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(follower.await.unwrap().body_ref(), b"call 2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn status_is_recorded_before_hooks_and_downstream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = |seen: &Arc<Mutex<Vec<Option<CacheStatus>>>>| {
            let seen = Arc::clone(seen);
            move |ctx: &Context| {
                seen.lock().unwrap().push(ctx.extensions().get::<CacheStatus>().copied());
            }
        };
        let downstream = Arc::clone(&seen);
        let backend = endpoint(move |ctx: Context| {
            downstream
                .lock()
                .unwrap()
                .push(ctx.extensions().get::<CacheStatus>().copied());
            async { Response::new(StatusCode::Ok) }
        });
        let cache = ResponseCache::by_request_path(
            memory(),
            Duration::from_secs(3),
            CacheOptions::new().on_miss(record(&seen)).on_hit(record(&seen)),
        );

        call(&cache, &backend, "/s").await;
        call(&cache, &backend, "/s").await;

        assert_eq!(
            *seen.lock().unwrap(),
            [Some(CacheStatus::Miss), Some(CacheStatus::Miss), Some(CacheStatus::Hit)]
        );
    }

    #[tokio::test]
    async fn declined_requests_bypass_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let store = memory();
        let bypassed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&bypassed);
        let probe = endpoint(move |ctx: Context| {
            if ctx.extensions().get::<CacheStatus>() == Some(&CacheStatus::Bypass) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            async { Response::new(StatusCode::Ok) }
        });
        let options = CacheOptions::new().strategy(|ctx: &Context| -> Result<Decision, StrategyError> {
            if *ctx.request().method() == Method::Get {
                Ok(Decision::skip())
            } else {
                Ok(Decision::cache(ctx.request().path()))
            }
        });
        let cache = ResponseCache::new(store.clone(), Duration::from_secs(3), options).unwrap();

        call(&cache, &backend, "/nocache").await;
        call(&cache, &backend, "/nocache").await;
        call(&cache, &probe, "/nocache").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bypassed.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn strategy_failure_falls_back_to_raw_uri() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let store = memory();
        let options = CacheOptions::new().key_prefix("p:").strategy(
            |_: &Context| -> Result<Decision, StrategyError> {
                Err(StrategyError::Rejected("no key".to_owned()))
            },
        );
        let cache = ResponseCache::new(store.clone(), Duration::from_secs(3), options).unwrap();

        call(&cache, &backend, "/raw?x=1").await;
        call(&cache, &backend, "/raw?x=1").await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.get("p:/raw?x=1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn decision_can_override_store_and_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let default_store = memory();
        let special = memory();
        let target: Arc<dyn CacheStore> = Arc::new(special.clone());
        let options = CacheOptions::new().strategy(move |ctx: &Context| -> Result<Decision, StrategyError> {
            Ok(Decision::cache(ctx.request().path())
                .with_store(Arc::clone(&target))
                .with_ttl(Duration::from_secs(1)))
        });
        let cache = ResponseCache::new(default_store.clone(), Duration::from_secs(60), options).unwrap();

        call(&cache, &backend, "/o").await;
        assert!(default_store.is_empty());
        assert!(special.get("/o").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1_500)).await;
        call(&cache, &backend, "/o").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheRecord>, StoreError> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }

        async fn set(&self, _key: &str, _record: &CacheRecord, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Timeout(Duration::from_millis(5)))
        }
    }

    #[tokio::test]
    async fn store_failures_fail_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = backend(&calls);
        let (misses, on_miss) = counter();
        let cache = ResponseCache::by_request_path(
            BrokenStore,
            Duration::from_secs(3),
            CacheOptions::new().on_miss(on_miss),
        );

        for _ in 0..2 {
            let response = call(&cache, &backend, "/down").await;
            assert_eq!(response.status(), StatusCode::Ok);
            assert_eq!(response.body_ref(), b"/down");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(misses.load(Ordering::SeqCst), 2);
    }
}
