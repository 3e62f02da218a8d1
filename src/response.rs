//! `Response`: the result of a completed request exchange, body fully
//! buffered in memory. Streaming or temp-file buffering strategies are
//! out of scope here, so the simplest choice is taken.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

use crate::redirect::History;

/// A completed HTTP response: status, headers, the URL it was ultimately
/// fetched from (after any redirects), its redirect history, and the fully
/// buffered body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    history: Vec<History>,
    body: Bytes,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        history: Vec<History>,
        body: Bytes,
    ) -> Response {
        Response {
            status,
            headers,
            url,
            history,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL this response was ultimately fetched from (the final hop of
    /// any redirect chain that was followed).
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The redirects followed to reach this response, oldest first.
    pub fn history(&self) -> &[History] {
        &self.history
    }

    /// `Content-Length`, if the server sent one.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    /// The response body as raw bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response, returning its body.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// The response body decoded as UTF-8 text.
    pub fn text(&self) -> crate::Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| crate::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// The response body deserialized as JSON.
    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| crate::Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish()
    }
}
