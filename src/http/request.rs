//! The request as seen by the middleware pipeline.

use super::{Headers, Method};

/// An incoming HTTP request.
///
/// Keeps the request target verbatim in [`uri`](Self::uri), so cache keys can
/// be derived from exactly what the client sent, alongside the path and raw
/// query split out of it.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/items?page=2").header("Accept-Language", "de");
///
/// assert_eq!(request.path(), "/items");
/// assert_eq!(request.uri(), "/items?page=2");
/// assert_eq!(request.query_string(), Some("page=2"));
/// assert_eq!(request.headers().get("accept-language"), Some("de"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    headers: Headers,
    // Byte offset of `?` in `uri`, if any.
    query_start: Option<usize>,
}

impl Request {
    /// Builds a request for `method` and request target `uri` with no headers.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        Self {
            method,
            query_start: uri.find('?'),
            uri,
            headers: Headers::new(),
        }
    }

    /// Appends a request header, builder style.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full request target, query string included.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The request target up to, not including, the `?`.
    pub fn path(&self) -> &str {
        match self.query_start {
            Some(pos) => &self.uri[..pos],
            None => &self.uri,
        }
    }

    /// The raw query string without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query_start.map(|pos| &self.uri[pos + 1..])
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }
}
