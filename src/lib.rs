#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # pledge
//!
//! `pledge` is an HTTP client. What it actually is, underneath, is a small
//! continuation-passing execution engine: a typed promise chain
//! ([`Promise`], [`Promisee`], [`Task`], [`AsyncTask`]) whose stages each run
//! pinned to an [`ExecutionContext`] (a UI window, a named worker thread, or
//! the shared pool), hopped between by a message-pump [`dispatch::Dispatcher`]
//! and backed by a per-thread [`registry`] of long-lived modules. The HTTP
//! client is simply the engine's first real producer: a per-thread HTTP
//! session drives one request through send/headers/body/redirect/error and
//! resolves or rejects a [`Promisee`] from whatever thread the transport
//! calls back on.
//!
//! ```no_run
//! use pledge::{Client, ExecutionContext, Url};
//!
//! # fn run() -> pledge::Result<()> {
//! let client = Client::new();
//! let url = Url::parse("http://example.com/")?;
//! let response = client.get(url).send_block(ExecutionContext::pool())?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! For chains that don't want to block the calling thread, `.send(ctx)`
//! returns a [`Promise`] to extend with `.then()` and start with `.done()`;
//! route both the send and any continuation through [`ExecutionContext::pool`]
//! unless the calling thread has its own registered [`dispatch::Dispatcher::spawn_pump_here`] loop to post back to.
//!
//! ## Optional Features
//!
//! - **default-tls**: enables HTTPS via `native-tls`.
//! - **json**: adds `RequestBuilder::json` / `Response::json`.

pub use http::Method;
pub use http::StatusCode;
pub use url::Url;

mod error;
pub use error::{Error, LogicErrorKind, Result};

pub mod context;
pub use context::ExecutionContext;

pub mod registry;

pub mod dispatch;
pub use dispatch::Dispatcher;

pub mod promise;
pub use promise::{Promise, Promisee};

pub mod task;
pub use task::{AsyncTask, Task};

mod body;
pub use body::Body;

mod request;
pub use request::{Request, RequestBuilder};

mod response;
pub use response::Response;

pub mod redirect;

mod transport;

mod client;
pub use client::{Client, ClientBuilder};

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    assert_send::<Client>();
    assert_sync::<Client>();
    assert_send::<Request>();
    assert_send::<RequestBuilder>();
    assert_send::<Response>();
    assert_send::<Error>();
    assert_sync::<Error>();
}
