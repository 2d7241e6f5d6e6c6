//! Fires a burst of concurrent requests at a slow handler behind the cache.
//!
//! ```text
//! RUST_LOG=rttp_cache=debug cargo run --example coalesced_report
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use rttp_cache::cache::{CacheOptions, MemoryStore, ResponseCache};
use rttp_cache::middleware::{Next, endpoint};
use rttp_cache::{Context, Method, Request, Response, StatusCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = MemoryStore::new(Duration::from_secs(60));
    let _sweeper = store.spawn_sweeper(Duration::from_secs(5));

    let shared = Arc::new(AtomicUsize::new(0));
    let shared_hook = Arc::clone(&shared);
    let cache = ResponseCache::by_request_uri(
        store,
        Duration::from_secs(10),
        CacheOptions::new()
            .ignore_query_order(true)
            .key_prefix("report:")
            .on_share_single_flight(move |_ctx: &Context| {
                shared_hook.fetch_add(1, Ordering::Relaxed);
            }),
    );

    let renders = Arc::new(AtomicUsize::new(0));
    let render_count = Arc::clone(&renders);
    let report = endpoint(move |ctx: Context| {
        let renders = Arc::clone(&render_count);
        async move {
            renders.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(250)).await;
            Response::new(StatusCode::Ok)
                .header("Content-Type", "text/plain")
                .body(format!("report for {}", ctx.request().uri()))
        }
    });

    let stack = vec![cache.into_handler(), report];
    let burst: Vec<_> = (0..50)
        .map(|i| {
            let stack = stack.clone();
            let uri = if i % 2 == 0 {
                "/report?year=2024&region=eu"
            } else {
                "/report?region=eu&year=2024"
            };
            tokio::spawn(async move {
                Next::new(stack)
                    .run(Context::new(Request::new(Method::Get, uri)))
                    .await
            })
        })
        .collect();

    for handle in burst {
        if let Ok(response) = handle.await {
            assert_eq!(response.status(), StatusCode::Ok);
        }
    }
    info!(
        renders = renders.load(Ordering::Relaxed),
        shared = shared.load(Ordering::Relaxed),
        "burst finished"
    );

    let follow_up = Next::new(stack)
        .run(Context::new(Request::new(Method::Get, "/report?region=eu&year=2024")))
        .await;
    info!(
        renders = renders.load(Ordering::Relaxed),
        body = %String::from_utf8_lossy(follow_up.body_ref()),
        "follow-up request served from cache"
    );
}
