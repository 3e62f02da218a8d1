//! `Request`/`RequestBuilder`: a request descriptor (verb, URL,
//! header-block, optional body stream) and the fallible builder that
//! assembles one.
//!
//! Trimmed to the fields the HTTP state machine actually needs and built
//! around `url::Url` instead of `http::Uri` (this crate's URLs are always
//! fully resolved before a `Request` exists).

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::body::Body;
use crate::client::Client;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::promise::Promise;
use crate::response::Response;

/// A request descriptor: verb, URL, header block, optional body.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Request {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> &mut Option<Body> {
        &mut self.body
    }

    /// Break the request into its parts, consuming it — used when handing
    /// it off to the transport layer.
    pub(crate) fn into_parts(self) -> (Method, Url, HeaderMap, Option<Body>) {
        (self.method, self.url, self.headers, self.body)
    }

    /// A reusable copy of this request for redirect replay, or `None` if
    /// the body is a one-shot stream that can't be replayed.
    pub(crate) fn try_clone(&self) -> Option<Request> {
        let body = match &self.body {
            Some(body) => Some(body.try_clone()?),
            None => None,
        };
        Some(Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        })
    }
}

/// Builds a [`Request`] against a bound [`Client`]. Construction can fail
/// (e.g. a bad header value), but the error is deferred until
/// `.send()`/`.send_block()` rather than panicking mid-chain.
#[must_use = "RequestBuilder does nothing until you call send() or send_block()"]
pub struct RequestBuilder {
    client: Client,
    request: crate::Result<Request>,
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, request: crate::Result<Request>) -> RequestBuilder {
        RequestBuilder { client, request }
    }

    /// Add a header, deferring any formatting error to `send`.
    pub fn header<K, V>(mut self, key: K, value: V) -> RequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let Ok(ref mut req) = self.request {
            match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
                (Ok(name), Ok(value)) => {
                    req.headers.append(name, value);
                }
                _ => {
                    self.request = Err(Error::invalid_url("invalid header name or value"));
                }
            }
        }
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Body>) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.body_mut() = Some(body.into());
        }
        self
    }

    /// Serialize `value` as the JSON request body and set `Content-Type:
    /// application/json`.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> RequestBuilder {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                if let Ok(ref mut req) = self.request {
                    req.headers_mut().insert(
                        http::header::CONTENT_TYPE,
                        HeaderValue::from_static("application/json"),
                    );
                    *req.body_mut() = Some(Body::from(bytes));
                }
            }
            Err(e) => {
                self.request = Err(Error::io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)));
            }
        }
        self
    }

    /// Send asynchronously, hopping onto `ctx` for the transport work and
    /// delivering the eventual `Response` (or `Error`) wherever the caller
    /// chains `.then()`.
    pub fn send(self, ctx: ExecutionContext) -> Promise<Response> {
        match self.request {
            Ok(request) => self.client.execute(request, ctx),
            Err(error) => self.client.execute_failed(error),
        }
    }

    /// Send and block the calling thread until the response (or error) is
    /// available. Transport work still runs on `ctx`.
    pub fn send_block(self, ctx: ExecutionContext) -> crate::Result<Response> {
        match self.request {
            Ok(request) => self.client.execute_block(request, ctx),
            Err(error) => Err(error),
        }
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder").field("request", &self.request).finish()
    }
}
