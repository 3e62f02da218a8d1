//! End-to-end tests driving the HTTP state machine through `Client`
//! against a loopback fixture server.

mod support;

use std::sync::mpsc;

use pledge::redirect::Policy;
use pledge::{Client, ExecutionContext, StatusCode, Url};

fn url_for(addr: std::net::SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

/// A simple GET surfaces the response's `Content-Length`, and the
/// continuation chained onto it runs on the context it was posted to.
#[test]
fn simple_get_reports_content_length() {
    let server = support::respond_fixed(
        "HTTP/1.1 200 OK\r\nContent-Length: 42\r\nConnection: close\r\n\r\n",
    );
    let client = Client::new();
    let url = url_for(server.addr, "/p");

    // `Pool` is reachable from any thread; the test thread never registers
    // a message pump of its own, so `ExecutionContext::current()` would
    // never receive this continuation.
    let (tx, rx) = mpsc::channel();
    client
        .get(url)
        .send(ExecutionContext::pool())
        .then(
            ExecutionContext::pool(),
            move |response| {
                let _ = tx.send(response.content_length());
            },
            move |_error| unreachable!("request should have succeeded"),
        )
        .done()
        .unwrap();

    let content_length = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert_eq!(content_length, Some(42));
}

/// A connection that can't be established throws, the exception branch of
/// the next stage receives it, and the success branch never runs. This is
/// built around a real transport failure rather than a server-returned
/// error status, since this client's `Response` delivers every status —
/// including 5xx — as a normal success value, never an exception.
#[test]
fn connection_failure_reaches_exception_branch_only() {
    // Nothing is listening on this port once it's handed back.
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let client = Client::new();
    let url = url_for(dead_addr, "/");

    let (tx, rx) = mpsc::channel();
    client
        .get(url)
        .send(ExecutionContext::pool())
        .then(
            ExecutionContext::pool(),
            move |_response| unreachable!("connection to a closed port must not succeed"),
            move |error| {
                let _ = tx.send(error);
            },
        )
        .done()
        .unwrap();

    let error = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert!(!error.is_logic_error());
}

/// A 302 redirect is followed with the original verb preserved.
#[test]
fn redirect_302_preserves_verb() {
    let server = support::serve(|request| {
        if support::request_line_is(request, "GET", "/a") {
            "HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else if support::request_line_is(request, "GET", "/b") {
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".to_string()
        } else {
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        }
    });
    let client = Client::builder().redirect(Policy::limited(5)).build().unwrap();
    let url = url_for(server.addr, "/a");

    let response = client
        .get(url)
        .send_block(ExecutionContext::pool())
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.history().len(), 1);
    assert_eq!(response.history()[0].status(), StatusCode::FOUND);
    assert!(response.url().path().ends_with("/b"));
}

/// A 303 redirect always forces the follow-up verb to GET, even
/// when the original request was a POST.
#[test]
fn redirect_303_forces_get() {
    let server = support::serve(|request| {
        if support::request_line_is(request, "POST", "/a") {
            "HTTP/1.1 303 See Other\r\nLocation: /b\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else if support::request_line_is(request, "GET", "/b") {
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else {
            // A non-GET hitting /b means the verb wasn't downgraded.
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        }
    });
    let client = Client::new();
    let url = url_for(server.addr, "/a");

    let response = client
        .post(url)
        .body("payload")
        .send_block(ExecutionContext::pool())
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// A redirect policy of `none()` returns the 30x response as-is rather than
/// following it.
#[test]
fn redirect_none_policy_stops_at_first_hop() {
    let server = support::respond_fixed(
        "HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );
    let client = Client::builder().redirect(Policy::none()).build().unwrap();
    let url = url_for(server.addr, "/a");

    let response = client
        .get(url)
        .send_block(ExecutionContext::pool())
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(response.history().is_empty());
}
