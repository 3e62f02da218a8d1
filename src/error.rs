use std::{error::Error as StdError, fmt, io};

use url::Url;

/// A `Result` alias where the `Err` case is [`pledge::Error`](Error).
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error type used for opaque transport/source errors.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors produced by the engine, the HTTP state machine, or the transport
/// it drives.
///
/// Mirrors the taxonomy a request exchange can observe: url parsing,
/// connection setup, mid-flight session teardown, local I/O, opaque
/// transport codes, and engine misuse. `LogicError` is fatal to the chain
/// that raised it but never to the process or to other chains.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    InvalidUrlFormat,
    ConnectionFailed,
    ConnectionTerminated,
    Io,
    Net(i32),
    Logic(LogicErrorKind),
}

/// Engine misuse: violations of the promise-chain protocol itself rather
/// than of the HTTP exchange it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicErrorKind {
    /// `Promise::done` (or the chain head's `run`) was invoked more than
    /// once on the same chain.
    AlreadyStarted,
    /// A stage's target context conflicted with an invariant the engine
    /// enforces (reserved for future context-compatibility checks).
    ContextConflict,
    /// [`crate::registry`] already holds a module of this type on the
    /// current thread.
    AlreadyRegistered,
}

impl fmt::Display for LogicErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicErrorKind::AlreadyStarted => "chain already started",
            LogicErrorKind::ContextConflict => "execution context conflict",
            LogicErrorKind::AlreadyRegistered => "module already registered on this thread",
        })
    }
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
            }),
        }
    }

    pub(crate) fn invalid_url<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::InvalidUrlFormat, Some(e))
    }

    pub(crate) fn connection_failed<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::ConnectionFailed, Some(e))
    }

    pub(crate) fn connection_terminated() -> Error {
        Error::new::<BoxError>(Kind::ConnectionTerminated, None)
    }

    pub(crate) fn io(e: io::Error) -> Error {
        Error::new(Kind::Io, Some(e))
    }

    pub(crate) fn net(code: i32, source: BoxError) -> Error {
        Error::new(Kind::Net(code), Some(source))
    }

    pub(crate) fn logic(kind: LogicErrorKind) -> Error {
        Error::new::<BoxError>(Kind::Logic(kind), None)
    }

    pub(crate) fn with_url(mut self, url: Url) -> Error {
        self.inner.url = Some(url);
        self
    }

    /// The URL of the request this error relates to, if any.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Strip the related URL (e.g. before logging an error that may carry
    /// sensitive query parameters).
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    /// True if this is a `ConnectionTerminated` error, i.e. the session was
    /// disconnected while this exchange was in flight.
    pub fn is_connection_terminated(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionTerminated)
    }

    /// True if this is an engine misuse error (double-start, double
    /// registration, ...).
    pub fn is_logic_error(&self) -> bool {
        matches!(self.inner.kind, Kind::Logic(_))
    }

    /// The engine misuse kind, if this is a `LogicError`.
    pub fn logic_kind(&self) -> Option<LogicErrorKind> {
        match self.inner.kind {
            Kind::Logic(k) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("pledge::Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref url) = self.inner.url {
            builder.field("url", url);
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::InvalidUrlFormat => f.write_str("invalid URL")?,
            Kind::ConnectionFailed => f.write_str("no connection could be opened")?,
            Kind::ConnectionTerminated => f.write_str("session was disconnected mid-exchange")?,
            Kind::Io => f.write_str("local stream read/write failure")?,
            Kind::Net(code) => write!(f, "transport error (code {code})")?,
            Kind::Logic(kind) => write!(f, "engine misuse: {kind}")?,
        }
        if let Some(ref url) = self.inner.url {
            write!(f, " for url ({url})")?;
        }
        if let Some(ref e) = self.inner.source {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::io(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::invalid_url(e)
    }
}
