//! `Client`/`ClientBuilder`: the HTTP API built atop the promise engine,
//! the verb-convenience surface (`get`/`post`/...) plus the `execute*`
//! methods `RequestBuilder` defers to.
//!
//! `Client` is a cloneable handle around an `Arc`'d config; `ClientBuilder`
//! is a `#[must_use]` builder that accumulates config fallibly before
//! `build()`.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::promise::Promise;
use crate::redirect::Policy;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::task;
use crate::transport::HttpExchangeTask;

/// A handle to make requests with. Cheap to clone (an `Arc` around shared
/// configuration); the underlying HTTP session is per-thread, not owned by
/// `Client` itself (see [`crate::transport::HttpSession`]).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    dispatcher: Dispatcher,
    headers: HeaderMap,
    redirect_policy: Policy,
}

impl Client {
    /// Build a `Client` with default configuration.
    pub fn new() -> Client {
        ClientBuilder::new().build().expect("Client::new()")
    }

    /// Start configuring a `Client`.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: Url) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn patch(&self, url: Url) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    pub fn head(&self, url: Url) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a request with an arbitrary verb.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Ok(Request::new(method, url)))
    }

    /// Insert this client's default headers into `request`, without
    /// overwriting any header the caller already set — applied at send
    /// time (not at `request()`) so it sees the request as the caller
    /// finished building it, not as it started out empty.
    fn apply_default_headers(&self, request: &mut Request) {
        for name in self.inner.headers.keys() {
            if !request.headers().contains_key(name) {
                for value in self.inner.headers.get_all(name) {
                    request.headers_mut().append(name, value.clone());
                }
            }
        }
    }

    /// Send asynchronously, without blocking the calling thread. The
    /// exchange runs on a dedicated worker ([`ExecutionContext::pool`]) or
    /// the named thread `ctx` identifies, and the returned `Promise`
    /// delivers the response wherever the caller chains `.then()`.
    pub(crate) fn execute(&self, mut request: Request, ctx: ExecutionContext) -> Promise<Response> {
        self.apply_default_headers(&mut request);
        let exchange = HttpExchangeTask::new(request, self.inner.redirect_policy.clone());
        task::run_async_task(self.inner.dispatcher.clone(), ctx, exchange)
    }

    /// A request that failed before it could even be built (e.g. a bad
    /// header) still needs to reach the caller as a rejected `Promise`,
    /// exactly as if the exchange itself had failed.
    pub(crate) fn execute_failed(&self, error: Error) -> Promise<Response> {
        task::run_task(self.inner.dispatcher.clone(), ExecutionContext::current(), move || Err(error))
    }

    /// Send and block the calling thread until the response (or error) is
    /// in hand.
    ///
    /// The handoff back to this (blocked) thread is posted through
    /// [`ExecutionContext::pool`] rather than `current()`: `Pool` is
    /// reachable from any thread, whereas `current()` would require this
    /// thread to have a registered message pump, which a thread that is
    /// simply blocking on `rx.recv()` never does.
    pub(crate) fn execute_block(&self, request: Request, ctx: ExecutionContext) -> crate::Result<Response> {
        let (tx, rx) = mpsc::channel();
        let tx_err = tx.clone();
        let promise = self.execute(request, ctx).then(
            ExecutionContext::pool(),
            move |response| {
                let _ = tx.send(Ok(response));
            },
            move |error| {
                let _ = tx_err.send(Err(error));
            },
        );
        promise.done()?;
        rx.recv().unwrap_or_else(|_| Err(Error::connection_terminated()))
    }
}

impl Default for Client {
    fn default() -> Client {
        Client::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// Accumulates configuration fallibly, then builds a [`Client`].
#[must_use = "ClientBuilder does nothing until you call build()"]
pub struct ClientBuilder {
    dispatcher: Dispatcher,
    headers: HeaderMap,
    redirect_policy: Policy,
    header_error: Option<Error>,
}

impl ClientBuilder {
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            dispatcher: Dispatcher::shared(),
            headers: HeaderMap::new(),
            redirect_policy: Policy::default(),
            header_error: None,
        }
    }

    /// Use a specific dispatcher instead of a freshly sized shared one —
    /// mainly useful for sharing one pool across several clients.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> ClientBuilder {
        self.dispatcher = dispatcher;
        self
    }

    /// A header sent on every request this client builds, unless the
    /// request already set one with the same name.
    pub fn default_header<K, V>(mut self, key: K, value: V) -> ClientBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => {
                self.header_error = Some(Error::invalid_url("invalid default header name or value"));
            }
        }
        self
    }

    /// The redirect policy requests built by this client follow. Defaults
    /// to [`Policy::default`] (follow up to 10 hops).
    pub fn redirect(mut self, policy: Policy) -> ClientBuilder {
        self.redirect_policy = policy;
        self
    }

    pub fn build(self) -> crate::Result<Client> {
        if let Some(error) = self.header_error {
            return Err(error);
        }
        Ok(Client {
            inner: Arc::new(ClientRef {
                dispatcher: self.dispatcher,
                headers: self.headers,
                redirect_policy: self.redirect_policy,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_default_headers_does_not_overwrite_caller_value() {
        let client = Client::builder().default_header("x-default", "fallback").build().unwrap();
        let mut request = Request::new(Method::GET, Url::parse("http://example.com").unwrap());
        request.headers_mut().insert("x-default", "explicit".parse().unwrap());
        client.apply_default_headers(&mut request);
        let values: Vec<_> = request.headers().get_all("x-default").iter().collect();
        assert_eq!(values, vec!["explicit"]);
    }

    #[test]
    fn apply_default_headers_fills_in_when_absent() {
        let client = Client::builder().default_header("x-default", "fallback").build().unwrap();
        let mut request = Request::new(Method::GET, Url::parse("http://example.com").unwrap());
        client.apply_default_headers(&mut request);
        assert_eq!(request.headers().get("x-default").unwrap(), "fallback");
    }

    #[test]
    fn bad_default_header_surfaces_at_build() {
        let err = Client::builder()
            .default_header("x-default", "\u{0}bad")
            .build()
            .unwrap_err();
        assert!(!err.is_logic_error());
    }
}
