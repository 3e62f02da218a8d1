//! Redirect policy: a `Policy` decides whether a given redirect attempt
//! should be followed, stopped, or turned into an error.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{BoxError, Error};

/// Status codes the HTTP state machine treats as redirects: 301, 302,
/// 303, 305, 307. 303 always forces the follow-up verb to GET; the
/// others preserve the original verb.
pub(crate) fn is_redirect_status(status: http::StatusCode) -> bool {
    matches!(
        status.as_u16(),
        301 | 302 | 303 | 305 | 307
    )
}

pub(crate) fn forces_get(status: http::StatusCode) -> bool {
    status.as_u16() == 303
}

/// Controls whether and how many redirects a chain will follow.
///
/// The default follows up to 10 hops before erroring.
#[derive(Clone)]
pub struct Policy {
    inner: Kind,
}

#[derive(Clone)]
enum Kind {
    Limit(usize),
    None,
    Custom(Arc<dyn Fn(Attempt<'_>) -> Action + Send + Sync>),
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Limit(max) => f.debug_tuple("Limit").field(max).finish(),
            Kind::None => f.write_str("None"),
            Kind::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy").field("inner", &self.inner).finish()
    }
}

impl Policy {
    /// Follow at most `max` redirects before failing with an error.
    pub fn limited(max: usize) -> Policy {
        Policy { inner: Kind::Limit(max) }
    }

    /// Never follow redirects; the 30x response is returned as-is.
    pub fn none() -> Policy {
        Policy { inner: Kind::None }
    }

    /// Decide redirect behavior with a custom closure.
    pub fn custom<F>(f: F) -> Policy
    where
        F: Fn(Attempt<'_>) -> Action + Send + Sync + 'static,
    {
        Policy {
            inner: Kind::Custom(Arc::new(f)),
        }
    }

    pub(crate) fn check(&self, attempt: Attempt<'_>) -> Action {
        match &self.inner {
            Kind::None => Action::Stop,
            Kind::Limit(max) => {
                if attempt.previous.len() >= *max {
                    Action::Error(Box::new(TooManyRedirects))
                } else {
                    Action::Follow
                }
            }
            Kind::Custom(f) => f(attempt),
        }
    }
}

impl Default for Policy {
    fn default() -> Policy {
        Policy::limited(10)
    }
}

/// One redirect under consideration: the status that triggered it, the
/// next location, and the chain of URLs already visited.
#[derive(Debug)]
pub struct Attempt<'a> {
    pub(crate) status: http::StatusCode,
    pub(crate) next: &'a Url,
    pub(crate) previous: &'a [Url],
}

impl<'a> Attempt<'a> {
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    pub fn url(&self) -> &Url {
        self.next
    }

    pub fn previous(&self) -> &[Url] {
        self.previous
    }
}

/// What to do about one redirect attempt.
#[derive(Debug)]
pub enum Action {
    Follow,
    Stop,
    Error(BoxError),
}

impl Action {
    pub(crate) fn into_result(self) -> crate::Result<bool> {
        match self {
            Action::Follow => Ok(true),
            Action::Stop => Ok(false),
            Action::Error(e) => Err(Error::connection_failed(e)),
        }
    }
}

/// One entry in a followed redirect chain, kept for diagnostics.
#[derive(Debug, Clone)]
pub struct History {
    pub(crate) status: http::StatusCode,
    pub(crate) url: Url,
    pub(crate) previous: Url,
}

impl History {
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn previous(&self) -> &Url {
        &self.previous
    }
}

#[derive(Debug)]
struct TooManyRedirects;

impl fmt::Display for TooManyRedirects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("too many redirects")
    }
}

impl std::error::Error for TooManyRedirects {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_status_codes_match_spec() {
        for code in [301, 302, 303, 305, 307] {
            assert!(is_redirect_status(http::StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 304, 308, 404] {
            assert!(!is_redirect_status(http::StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn status_303_forces_get() {
        assert!(forces_get(http::StatusCode::from_u16(303).unwrap()));
        assert!(!forces_get(http::StatusCode::from_u16(302).unwrap()));
    }

    #[test]
    fn default_policy_stops_after_ten() {
        let policy = Policy::default();
        let next = Url::parse("http://example.com/b").unwrap();
        let previous = vec![Url::parse("http://example.com/a").unwrap(); 10];
        let action = policy.check(Attempt {
            status: http::StatusCode::from_u16(302).unwrap(),
            next: &next,
            previous: &previous,
        });
        assert!(matches!(action, Action::Error(_)));
    }

    #[test]
    fn none_policy_always_stops() {
        let policy = Policy::none();
        let next = Url::parse("http://example.com/b").unwrap();
        let action = policy.check(Attempt {
            status: http::StatusCode::from_u16(302).unwrap(),
            next: &next,
            previous: &[],
        });
        assert!(matches!(action, Action::Stop));
    }
}
