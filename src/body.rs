//! Request bodies for the HTTP state machine: a reusable in-memory chunk,
//! or a boxed one-shot stream for bodies too large to buffer twice.
//!
//! Buffering a stream body to a temp file instead of memory is out of
//! scope here; `Body` only distinguishes "replayable bytes" from "opaque
//! one-shot stream".

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::error::BoxError;

/// A request body: either bytes the engine can replay across a redirect
/// that re-sends the same request, or a stream that can only be consumed
/// once.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Reusable(Bytes),
    Streaming(Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>),
}

impl Body {
    /// An empty, reusable body — the default for requests with no body.
    pub fn empty() -> Body {
        Body::from_bytes(Bytes::new())
    }

    pub(crate) fn from_bytes(bytes: Bytes) -> Body {
        Body {
            inner: Inner::Reusable(bytes),
        }
    }

    /// Wrap a stream of chunks as a one-shot body. A redirect that would
    /// need to re-send this body instead fails with `ConnectionFailed`:
    /// non-reusable bodies cannot be replayed.
    pub fn wrap_stream<S>(stream: S) -> Body
    where
        S: Stream + Send + 'static,
        S::Item: Into<Result<Bytes, BoxError>>,
    {
        use futures_util::StreamExt;
        Body {
            inner: Inner::Streaming(Box::pin(stream.map(Into::into))),
        }
    }

    /// The body's bytes, if it is the reusable kind.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(bytes.as_ref()),
            Inner::Streaming(_) => None,
        }
    }

    /// True if this body can be replayed (needed before following a
    /// redirect that re-sends the request body).
    pub(crate) fn is_reusable(&self) -> bool {
        matches!(self.inner, Inner::Reusable(_))
    }

    pub(crate) fn try_clone(&self) -> Option<Body> {
        match &self.inner {
            Inner::Reusable(bytes) => Some(Body::from_bytes(bytes.clone())),
            Inner::Streaming(_) => None,
        }
    }

    pub(crate) fn into_stream(self) -> Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>> {
        match self.inner {
            Inner::Reusable(bytes) => Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
            Inner::Streaming(stream) => stream,
        }
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Reusable(bytes) => f.debug_tuple("Body").field(&bytes.len()).finish(),
            Inner::Streaming(_) => f.write_str("Body(<stream>)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Body {
        Body::from_bytes(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::from_bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::from_bytes(Bytes::from(s))
    }
}
