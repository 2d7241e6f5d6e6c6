//! The cached artifact: a captured response envelope.
//!
//! [`CacheRecord::capture`] snapshots a downstream [`Response`] and
//! [`CacheRecord::replay`] rebuilds an equivalent one. The record owns a copy
//! of the body bytes, so later writes to the live response buffer never leak
//! into what was cached.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::{Headers, Response, StatusCode};

/// A cached HTTP response: status, headers and body.
///
/// Records are immutable once built. On the wire (see [`to_bytes`](Self::to_bytes))
/// a record is a JSON object with an integer `status`, `headers` as a list of
/// `[name, [values…]]` pairs, and a base64 `body`, so binary bodies survive
/// stores that only speak strings.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::CacheRecord;
/// use rttp_cache::{Response, StatusCode};
///
/// let live = Response::new(StatusCode::Ok)
///     .header("Set-Cookie", "a=1")
///     .header("Set-Cookie", "b=2")
///     .body("payload");
///
/// let record = CacheRecord::capture(&live, true);
/// let replayed = record.replay(true);
///
/// assert_eq!(replayed.status(), StatusCode::Ok);
/// assert_eq!(replayed.body_ref(), b"payload");
/// assert_eq!(replayed.headers().get_all("set-cookie").count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    status: StatusCode,
    headers: Headers,
    #[serde(with = "body_base64")]
    body: Bytes,
}

impl CacheRecord {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Snapshots `response` into a record.
    ///
    /// The body is copied out of the response buffer. With `with_headers`
    /// unset the record carries no headers at all.
    pub fn capture(response: &Response, with_headers: bool) -> Self {
        let headers = if with_headers {
            response.headers().clone()
        } else {
            Headers::new()
        };

        Self {
            status: response.status(),
            headers,
            body: Bytes::copy_from_slice(response.body_ref()),
        }
    }

    /// Builds a fresh response carrying this record's status, headers and body.
    ///
    /// Every value of every header is added; nothing is overwritten.
    pub fn replay(&self, with_headers: bool) -> Response {
        let mut response = Response::new(self.status).body_bytes(self.body.to_vec());
        if with_headers {
            for (name, values) in self.headers.groups() {
                for value in values {
                    response.add_header(name, value.as_str());
                }
            }
        }
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Only `2xx` responses are written to a store.
    pub fn is_cacheable(&self) -> bool {
        self.status.is_success()
    }

    /// Encodes the record for a byte-oriented store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a record written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(payload: &[u8]) -> Result<Self, StoreError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

mod body_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
