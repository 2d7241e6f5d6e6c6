//! Cache key strategies.
//!
//! A [`KeyStrategy`] looks at a request and returns a [`Decision`]: whether to
//! cache at all, under which key, and optionally which store and TTL to use for
//! this request instead of the middleware defaults. Any closure
//! `Fn(&Context) -> Result<Decision, StrategyError>` is a strategy.
//!
//! | Strategy           | `/p?b=2&a=1` keys as |
//! |--------------------|----------------------|
//! | [`RequestUri`]     | `/p?b=2&a=1`         |
//! | [`SortedQueryUri`] | `/p?a=1&b=2`         |
//! | [`RequestPath`]    | `/p`                 |

use std::{fmt, sync::Arc, time::Duration};

use tracing::warn;
use url::{Url, form_urlencoded};

use super::{error::StrategyError, store::CacheStore};
use crate::context::Context;

/// Per-request outcome of a [`KeyStrategy`].
#[derive(Clone)]
pub struct Decision {
    /// `false` forwards the request untouched.
    pub should_cache: bool,
    /// Key before the middleware's configured prefix is applied.
    pub key: String,
    /// Store to use instead of the middleware default.
    pub store: Option<Arc<dyn CacheStore>>,
    /// TTL to use instead of the middleware default. Zero is ignored.
    pub ttl: Option<Duration>,
}

impl Decision {
    /// Cache this request under `key`.
    pub fn cache(key: impl Into<String>) -> Self {
        Self {
            should_cache: true,
            key: key.into(),
            store: None,
            ttl: None,
        }
    }

    /// Leave this request alone.
    pub fn skip() -> Self {
        Self {
            should_cache: false,
            key: String::new(),
            store: None,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl fmt::Debug for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decision")
            .field("should_cache", &self.should_cache)
            .field("key", &self.key)
            .field("store", &self.store.as_ref().map(|_| "<override>"))
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Derives a cache key from a request, fallibly.
///
/// When `decide` fails the middleware logs the error and keys the request by
/// its raw URI.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_cache::cache::{Decision, KeyStrategy, StrategyError};
/// use rttp_cache::{Context, Method, Request};
///
/// let only_get = |ctx: &Context| -> Result<Decision, StrategyError> {
///     let request = ctx.request();
///     if *request.method() != Method::Get || request.path().starts_with("/admin") {
///         return Ok(Decision::skip());
///     }
///     Ok(Decision::cache(request.path()).with_ttl(Duration::from_secs(30)))
/// };
///
/// let ctx = Context::new(Request::new(Method::Post, "/items"));
/// assert!(!only_get.decide(&ctx).unwrap().should_cache);
/// ```
pub trait KeyStrategy: Send + Sync {
    fn decide(&self, ctx: &Context) -> Result<Decision, StrategyError>;
}

impl<F> KeyStrategy for F
where
    F: Fn(&Context) -> Result<Decision, StrategyError> + Send + Sync,
{
    fn decide(&self, ctx: &Context) -> Result<Decision, StrategyError> {
        self(ctx)
    }
}

/// Keys by the full request URI, query string included, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestUri;

impl KeyStrategy for RequestUri {
    fn decide(&self, ctx: &Context) -> Result<Decision, StrategyError> {
        Ok(Decision::cache(ctx.request().uri()))
    }
}

/// Keys by the request URI with its query parameters put in canonical order.
///
/// See [`sort_query`]. Unparseable URIs fall back to the raw URI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortedQueryUri;

impl KeyStrategy for SortedQueryUri {
    fn decide(&self, ctx: &Context) -> Result<Decision, StrategyError> {
        let uri = ctx.request().uri();
        let key = sort_query(uri).unwrap_or_else(|error| {
            warn!(%error, "falling back to raw URI for cache key");
            uri.to_owned()
        });
        Ok(Decision::cache(key))
    }
}

/// Keys by the request path alone; every query string shares one entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestPath;

impl KeyStrategy for RequestPath {
    fn decide(&self, ctx: &Context) -> Result<Decision, StrategyError> {
        Ok(Decision::cache(ctx.request().path()))
    }
}

/// Rewrites `uri` so its query parameters are sorted by name, then by value.
///
/// The path is kept exactly as sent; only the query is rewritten. Parameters
/// are decoded as `application/x-www-form-urlencoded` and rendered back as
/// `name=value` pairs joined by `&`, without re-encoding, so an encoded `&` or
/// `=` inside a value is indistinguishable from a separator: `?a=1%26b%3D2`
/// and `?a=1&b=2` produce the same key. A URI without query parameters is
/// returned unchanged. `uri` must be an absolute path or an absolute URI; for
/// the latter only its path is kept.
///
/// ```
/// use rttp_cache::cache::sort_query;
///
/// assert_eq!(sort_query("/p?c=3&b=2&a=1").unwrap(), "/p?a=1&b=2&c=3");
/// assert_eq!(sort_query("/p?a=2&a=1").unwrap(), "/p?a=1&a=2");
/// assert_eq!(sort_query("/p").unwrap(), "/p");
/// assert!(sort_query("no-leading-slash?a=1").is_err());
/// ```
pub fn sort_query(uri: &str) -> Result<String, StrategyError> {
    let (target, query) = match uri.split_once('?') {
        Some((target, query)) => (target, query),
        None => (uri, ""),
    };
    let path = request_path(uri, target)?;

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        return Ok(uri.to_owned());
    }
    pairs.sort();

    let query = pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!("{path}?{query}"))
}

// Origin-form targets are used verbatim; absolute-form ones are reduced to
// their path.
fn request_path(uri: &str, target: &str) -> Result<String, StrategyError> {
    if target.starts_with('/') {
        return Ok(target.to_owned());
    }

    let invalid = |reason: String| StrategyError::InvalidUri {
        uri: uri.to_owned(),
        reason,
    };
    match Url::parse(target) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url.path().to_owned()),
        Ok(_) => Err(invalid("not a hierarchical URI".to_owned())),
        Err(e) => Err(invalid(e.to_string())),
    }
}
