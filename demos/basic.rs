//! A plain blocking GET — `send_block` runs the exchange on the shared pool
//! and blocks this thread until the response (or error) is in hand, the
//! shape a small CLI tool reaches for first.

use pledge::{Client, ExecutionContext, Url};

fn main() -> pledge::Result<()> {
    env_logger::init();

    let client = Client::new();
    let url = Url::parse("http://example.com/")?;

    let response = client.get(url).send_block(ExecutionContext::pool())?;

    println!("status: {}", response.status());
    if let Some(len) = response.content_length() {
        println!("content-length: {len}");
    }
    Ok(())
}
