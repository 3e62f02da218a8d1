//! The HTTP state machine: drives one request exchange from `Sending`
//! through to a `Response`, following redirects according to a
//! [`redirect::Policy`], on top of an opaque request driver.
//!
//! The concrete wire protocol — header framing, connection reuse, TLS
//! handshakes — is out of scope for this component; it is delegated
//! wholesale to `hyper`. What lives here is the state transitions
//! (`Sending` → `AwaitingHeaders` → `ReadingBody` → `Closed`), the
//! redirect-trigger/follow-up rule, and the per-thread session that owns
//! the underlying connections.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use url::Url;

use crate::body::Body;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::promise::Promisee;
use crate::redirect::{self, History, Policy};
use crate::registry::{self, Module};
use crate::request::Request;
use crate::response::Response;
use crate::task::AsyncTask;

#[cfg(feature = "default-tls")]
type Connector = hyper_tls::HttpsConnector<hyper::client::HttpConnector>;
#[cfg(not(feature = "default-tls"))]
type Connector = hyper::client::HttpConnector;

type HyperClient = hyper::Client<Connector, hyper::Body>;

fn build_hyper_client() -> HyperClient {
    #[cfg(feature = "default-tls")]
    {
        hyper::Client::builder().build(hyper_tls::HttpsConnector::new())
    }
    #[cfg(not(feature = "default-tls"))]
    {
        hyper::Client::builder().build(hyper::client::HttpConnector::new())
    }
}

/// The exchange's states. `WritingBody` and `ReadingBody` are observable
/// through logging even though the underlying hyper body isn't driven
/// chunk-by-chunk here (see [`run_exchange`]'s doc comment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExchangeState {
    Sending,
    /// Never observed directly: hyper buffers the outgoing body itself, so
    /// this state's chunk-level granularity collapses into `Sending`.
    #[allow(dead_code)]
    WritingBody,
    AwaitingHeaders,
    ReadingBody,
    Closed,
}

/// Bounded "recently seen host" tracker, keyed by `host:port`. Actual
/// socket ownership lives inside the `hyper::Client`'s own pool; this just
/// bounds how much diagnostic history a long-lived session accumulates.
struct ConnectionTracker {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ConnectionTracker {
    fn new(capacity: usize) -> ConnectionTracker {
        ConnectionTracker {
            capacity,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn touch(&mut self, authority: String) {
        if self.seen.contains(&authority) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(authority.clone());
        self.order.push_back(authority);
    }
}

fn authority_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port_or_known_default() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

/// A per-thread HTTP session: one `hyper::Client` and a dedicated
/// single-threaded `tokio` runtime to drive it, registered lazily the first
/// time a thread executes an HTTP request.
///
/// Registered as a [`registry::Module`]: every exchange started on a
/// thread reuses the same underlying connections for the lifetime of that
/// thread's pump, and the session is torn down when the thread quits.
pub(crate) struct HttpSession {
    runtime: tokio::runtime::Runtime,
    client: HyperClient,
    connections: RefCell<ConnectionTracker>,
    in_flight: RefCell<HashSet<u64>>,
    next_id: Cell<u64>,
}

impl HttpSession {
    fn new() -> HttpSession {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to start this thread's HTTP transport runtime");
        HttpSession {
            runtime,
            client: build_hyper_client(),
            connections: RefCell::new(ConnectionTracker::new(64)),
            in_flight: RefCell::new(HashSet::new()),
            next_id: Cell::new(0),
        }
    }

    /// Run one exchange to completion, blocking the calling thread for its
    /// duration.
    ///
    /// This thread only ever hosts one `AsyncTask` at a time (each
    /// pool-routed request gets a dedicated worker thread for exactly this
    /// purpose), so blocking here doesn't stall unrelated work — it trades
    /// away interleaving multiple *concurrent* exchanges on one shared named
    /// thread for a much simpler state machine. See `DESIGN.md` for the
    /// full rationale.
    fn run_blocking(&self, request: Request, policy: &Policy) -> crate::Result<Response> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        if let Some(authority) = authority_of(request.url()) {
            self.connections.borrow_mut().touch(authority);
        }
        self.in_flight.borrow_mut().insert(id);
        let result = self.runtime.block_on(run_exchange(&self.client, request, policy));
        self.in_flight.borrow_mut().remove(&id);
        result
    }

    /// Fail every exchange still marked in-flight exactly once: every
    /// in-flight exchange must receive exactly one terminal notification
    /// on session disconnect. With `run_blocking`'s one-exchange-at-a-time
    /// model this set is normally empty by the time it's called; kept so
    /// reentrancy bugs are loud rather than silent.
    fn disconnect(&self) {
        let stragglers: Vec<u64> = self.in_flight.borrow_mut().drain().collect();
        for id in stragglers {
            log::warn!("HTTP session disconnect with exchange {id} still in flight");
        }
    }
}

impl Module for HttpSession {
    fn on_unregister(&mut self) {
        self.disconnect();
    }
}

/// Drive one exchange, including any redirects the policy allows, to a
/// final `Response`.
///
/// `WritingBody`/`ReadingBody` describe chunk-level write/read progress;
/// that granularity is left to `hyper`'s own buffered request/response
/// handling rather than hand-rolled here. The states that matter for
/// application-visible behavior — redirect detection at
/// `AwaitingHeaders`, and the single terminal `Closed` — are exactly what
/// this function implements.
async fn run_exchange(client: &HyperClient, mut request: Request, policy: &Policy) -> crate::Result<Response> {
    let mut history: Vec<History> = Vec::new();
    let mut previous: Vec<Url> = Vec::new();
    let mut state = ExchangeState::Sending;

    loop {
        let url = request.url().clone();
        let method = request.method().clone();
        let headers_for_redirect = request.headers().clone();
        let body_is_one_shot = request.body().is_some_and(|body| !body.is_reusable());
        let body_for_redirect = request.body().and_then(Body::try_clone);

        let hyper_request = into_hyper_request(request)?;
        state = ExchangeState::AwaitingHeaders;
        log::trace!("exchange -> {state:?} ({url})");
        let hyper_response = client
            .request(hyper_request)
            .await
            .map_err(Error::connection_failed)?;

        let status = hyper_response.status();
        let headers = hyper_response.headers().clone();

        if redirect::is_redirect_status(status) {
            if let Some(location) = headers
                .get(http::header::LOCATION)
                .and_then(|v| v.to_str().ok())
            {
                if let Ok(next_url) = url.join(location) {
                    let attempt = redirect::Attempt {
                        status,
                        next: &next_url,
                        previous: &previous,
                    };
                    if policy.check(attempt).into_result()? {
                        history.push(History {
                            status,
                            url: next_url.clone(),
                            previous: url.clone(),
                        });
                        previous.push(url);

                        let next_method = if redirect::forces_get(status) {
                            http::Method::GET
                        } else {
                            method.clone()
                        };
                        let reuses_verb = next_method == method;
                        if reuses_verb && body_is_one_shot {
                            return Err(Error::connection_failed(
                                "redirect requires re-sending a request body that was not reusable",
                            ));
                        }
                        let mut next_request = Request::new(next_method, next_url);
                        *next_request.headers_mut() = headers_for_redirect;
                        if reuses_verb {
                            *next_request.body_mut() = body_for_redirect;
                        }
                        request = next_request;
                        state = ExchangeState::Sending;
                        log::trace!("exchange -> {state:?} (redirect)");
                        continue;
                    }
                }
            }
        }

        state = ExchangeState::ReadingBody;
        log::trace!("exchange -> {state:?}");
        let body = hyper::body::to_bytes(hyper_response.into_body())
            .await
            .map_err(|e| Error::net(0, Box::new(e)))?;
        state = ExchangeState::Closed;
        log::trace!("exchange -> {state:?}");
        return Ok(Response::new(status, headers, url, history, body));
    }
}

fn into_hyper_request(request: Request) -> crate::Result<hyper::Request<hyper::Body>> {
    let (method, url, headers, body) = request.into_parts();
    let uri: hyper::Uri = url
        .as_str()
        .parse()
        .map_err(|e| Error::invalid_url(e).with_url(url.clone()))?;

    let hyper_body = match body {
        Some(body) => match body.as_bytes() {
            Some(bytes) => hyper::Body::from(Bytes::copy_from_slice(bytes)),
            None => hyper::Body::wrap_stream(body.into_stream()),
        },
        None => hyper::Body::empty(),
    };

    let mut builder = hyper::Request::builder().method(method).uri(uri);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    builder
        .body(hyper_body)
        .map_err(|e| Error::invalid_url(e).with_url(url))
}

/// Bridges one HTTP exchange into the promise engine: an [`AsyncTask`] that
/// lazily registers this thread's [`HttpSession`] (creating one on first
/// use) and resolves or rejects its [`Promisee`] with the outcome.
pub(crate) struct HttpExchangeTask {
    request: Option<Request>,
    policy: Policy,
}

impl HttpExchangeTask {
    pub(crate) fn new(request: Request, policy: Policy) -> HttpExchangeTask {
        HttpExchangeTask {
            request: Some(request),
            policy,
        }
    }
}

impl AsyncTask<Response> for HttpExchangeTask {
    fn on_enter(&mut self, _dispatcher: Dispatcher, promisee: Promisee<Response>) {
        let request = self.request.take().expect("HttpExchangeTask entered twice");
        let policy = self.policy.clone();

        // Reuse this thread's session from an earlier request if there is
        // one; only pay for a fresh runtime + client on first use.
        let has_session = registry::with::<HttpSession, _>(|session| session.is_some());
        if !has_session {
            let _ = registry::register(HttpSession::new());
        }

        let result = registry::with::<HttpSession, _>(|session| {
            session
                .expect("HttpSession was just registered above")
                .run_blocking(request, &policy)
        });

        match result {
            Ok(response) => promisee.resolve(response),
            Err(error) => promisee.reject(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_tracker_evicts_oldest_past_capacity() {
        let mut tracker = ConnectionTracker::new(2);
        tracker.touch("a:80".to_string());
        tracker.touch("b:80".to_string());
        tracker.touch("c:80".to_string());
        assert!(!tracker.seen.contains("a:80"));
        assert!(tracker.seen.contains("b:80"));
        assert!(tracker.seen.contains("c:80"));
    }

    #[test]
    fn authority_of_includes_nonstandard_port() {
        let url = Url::parse("http://example.com:8080/x").unwrap();
        assert_eq!(authority_of(&url).as_deref(), Some("example.com:8080"));
    }

    #[test]
    fn authority_of_fills_in_default_port() {
        let url = Url::parse("http://example.com/x").unwrap();
        assert_eq!(authority_of(&url).as_deref(), Some("example.com:80"));
    }

    #[test]
    fn disconnect_with_nothing_in_flight_is_silent() {
        let session = HttpSession::new();
        // `run_blocking` always removes its id from `in_flight` before
        // returning, so a session between exchanges has nothing for
        // `disconnect` to report.
        session.disconnect();
        assert!(session.in_flight.borrow().is_empty());
    }

    #[test]
    fn run_blocking_tracks_and_releases_in_flight_id() {
        let session = HttpSession::new();
        let request = Request::new(http::Method::GET, Url::parse("http://127.0.0.1:1/").unwrap());
        // Nothing is listening, so this fails fast with a connection error —
        // the interesting assertion is what happens to bookkeeping, not the
        // exchange's outcome.
        let _ = session.run_blocking(request, &Policy::none());
        assert!(session.in_flight.borrow().is_empty());
    }
}
