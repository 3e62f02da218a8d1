//! A minimal loopback fixture server for the HTTP state-machine tests.
//!
//! Raw `std::net::TcpListener`, not `hyper`'s server side: the state machine
//! under test is entirely on the client, so the fixture only needs to read
//! one request's head and hand back whatever bytes the test wants, then
//! close the connection (no keep-alive bookkeeping to get in the way of
//! per-test assertions).

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;

pub struct Server {
    pub addr: SocketAddr,
}

/// Spawn a server that replies with the same fixed raw HTTP response to
/// every connection it accepts, closing each one afterward.
#[allow(unused)]
pub fn respond_fixed(raw_response: &'static str) -> Server {
    serve(move |_request| raw_response.to_string())
}

/// Spawn a server whose response is computed from the raw request bytes it
/// received (head only; enough to inspect the request line and headers).
pub fn serve<F>(respond: F) -> Server
where
    F: Fn(&[u8]) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("local_addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let request = read_request_head(&mut stream);
            if request.is_empty() {
                continue;
            }
            let response = respond(&request);
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
    });
    Server { addr }
}

/// True if `request`'s request line is `method`-to-`path`. Tolerant of
/// either origin-form (`GET /a HTTP/1.1`) or absolute-form
/// (`GET http://host/a HTTP/1.1`) request targets, since which one a
/// client sends for a direct (non-proxied) connection isn't something this
/// fixture should have to pin down.
pub fn request_line_is(request: &[u8], method: &str, path: &str) -> bool {
    let Some(line_end) = request.windows(2).position(|w| w == b"\r\n") else {
        return false;
    };
    let Ok(line) = std::str::from_utf8(&request[..line_end]) else {
        return false;
    };
    let mut parts = line.split(' ');
    let Some(got_method) = parts.next() else { return false };
    let Some(target) = parts.next() else { return false };
    got_method == method && (target == path || target.ends_with(path))
}

fn read_request_head(stream: &mut std::net::TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    buf
}
