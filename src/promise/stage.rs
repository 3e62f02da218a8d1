//! Stage kinds: the two shapes a handler attached with
//! [`Promise::then`](super::Promise::then) can take.
//!
//! - **Functor pair** — two free functions, `on_success(T) -> U` and
//!   `on_exception(Error) -> U`; exactly one fires, and the stage always
//!   produces a `U` (it cannot itself raise — it's a pure recovery/mapping
//!   step).
//! - **Handler object** — one value implementing [`Handler`], whose
//!   `on_result`/`on_exception` methods may themselves return `Err`,
//!   propagating a fresh exception downstream, and whose `on_completed` is
//!   called when this stage turns out to be the chain's tail and its result
//!   was not an exception.
//!
//! The two shapes mirror two ways of finishing a request seen elsewhere
//! in this crate's lineage: a plain `.map`/`.map_err`-style combinator
//! chain, and an object-ish completion callback that inspects the
//! outcome and either fills a channel or logs a final failure — i.e. a
//! "handler object" with an implicit terminal hook.

use crate::error::Error;

/// An object that reacts to a stage's input, in place of a functor pair.
///
/// `on_completed` is only invoked when this handler sits at the tail of its
/// chain and `on_result` did not itself produce an exception.
pub trait Handler<T, U>: Send {
    /// The previous stage produced `value`.
    fn on_result(&mut self, value: T) -> crate::Result<U>;

    /// The previous stage raised `error`.
    fn on_exception(&mut self, error: Error) -> crate::Result<U>;

    /// Called once this handler is confirmed to be the chain's tail and
    /// `on_result` completed without raising. No-op by default: most
    /// handlers only care about the value they produced.
    fn on_completed(&mut self) {}
}

pub(crate) enum Kind<T, U> {
    FunctorPair {
        success: Box<dyn FnOnce(T) -> U + Send>,
        exception: Box<dyn FnOnce(Error) -> U + Send>,
    },
    Handler(Box<dyn Handler<T, U>>),
}

impl<T, U> Kind<T, U> {
    pub(crate) fn invoke(self, input: Result<T, Error>, is_tail: bool) -> crate::Result<U> {
        match self {
            Kind::FunctorPair { success, exception } => Ok(match input {
                Ok(value) => success(value),
                Err(error) => exception(error),
            }),
            Kind::Handler(mut handler) => {
                let output = match input {
                    Ok(value) => handler.on_result(value),
                    Err(error) => handler.on_exception(error),
                };
                if is_tail && output.is_ok() {
                    handler.on_completed();
                }
                output
            }
        }
    }
}

/// Adapts a plain closure pair into a [`Handler`]-shaped `Kind::FunctorPair`.
pub(crate) fn functor_pair<T, U, F, E>(success: F, exception: E) -> Kind<T, U>
where
    F: FnOnce(T) -> U + Send + 'static,
    E: FnOnce(Error) -> U + Send + 'static,
{
    Kind::FunctorPair {
        success: Box::new(success),
        exception: Box::new(exception),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        completed: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl Handler<u32, u32> for Recorder {
        fn on_result(&mut self, value: u32) -> crate::Result<u32> {
            Ok(value + 1)
        }

        fn on_exception(&mut self, error: Error) -> crate::Result<u32> {
            Err(error)
        }

        fn on_completed(&mut self) {
            self.completed
                .store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn functor_pair_always_succeeds() {
        let kind: Kind<u32, u32> = functor_pair(|v| v + 1, |_e| 0);
        assert_eq!(kind.invoke(Ok(4), false).unwrap(), 5);

        let kind: Kind<u32, u32> = functor_pair(|v| v + 1, |_e| 0);
        assert_eq!(kind.invoke(Err(Error::connection_terminated()), false).unwrap(), 0);
    }

    #[test]
    fn handler_on_completed_fires_only_at_tail_on_success() {
        let completed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let kind: Kind<u32, u32> = Kind::Handler(Box::new(Recorder {
            completed: completed.clone(),
        }));
        assert_eq!(kind.invoke(Ok(1), false).unwrap(), 2);
        assert!(!completed.load(std::sync::atomic::Ordering::SeqCst));

        let completed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let kind: Kind<u32, u32> = Kind::Handler(Box::new(Recorder {
            completed: completed.clone(),
        }));
        assert_eq!(kind.invoke(Ok(1), true).unwrap(), 2);
        assert!(completed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn handler_exception_never_calls_on_completed() {
        let completed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let kind: Kind<u32, u32> = Kind::Handler(Box::new(Recorder {
            completed: completed.clone(),
        }));
        assert!(kind.invoke(Err(Error::connection_terminated()), true).is_err());
        assert!(!completed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
