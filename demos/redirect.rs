//! A blocking GET that follows redirects, printing the hops it took along
//! the way — exercises the HTTP state machine's redirect-trigger/follow-up
//! rule: 303 forces GET, every other redirect status preserves the
//! original verb.

use pledge::redirect::Policy;
use pledge::{Client, ExecutionContext, Url};

fn main() -> pledge::Result<()> {
    env_logger::init();

    let client = Client::builder().redirect(Policy::limited(5)).build()?;
    let url = Url::parse("http://example.com/redirect")?;

    let response = client.get(url).send_block(ExecutionContext::pool())?;

    for hop in response.history() {
        println!("{} -> {}", hop.previous(), hop.url());
    }
    println!("final status: {}", response.status());
    Ok(())
}
