//! Execution contexts: the routing tag every promise-chain node carries.
//!
//! An [`ExecutionContext`] identifies *where* a stage procedure must run —
//! a UI window's message loop, a specific named worker thread, or "any
//! thread in the shared pool". [`Dispatcher::post`](crate::dispatch::Dispatcher::post)
//! is the only thing that interprets it.

use std::fmt;
use std::thread::ThreadId;

/// A window handle, opaque to the engine beyond identity and equality.
///
/// The engine never dereferences this; it is only ever handed back to
/// whatever UI toolkit posted it, via [`ExecutionContext::from_ui`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub usize);

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

/// Where a promise-chain node's stage procedure must run.
///
/// `Pool == Pool` always; a `Pool` context never
/// compares equal to a concrete thread, because delivery to "some pool
/// thread" is never the same identity as delivery to one specific thread.
/// Two non-pool contexts are equal iff their thread ids match (a `Ui`
/// context additionally carries the window it posts to, but identity for
/// routing purposes is the thread).
#[derive(Clone, Copy)]
pub enum ExecutionContext {
    /// Delivery by posting to a specific window's message queue.
    Ui {
        /// The window this context posts to.
        window: WindowHandle,
        /// The thread that owns `window`'s message loop.
        thread: ThreadId,
    },
    /// Delivery by posting to a specific thread's message queue.
    Worker {
        /// The thread this context posts to.
        thread: ThreadId,
    },
    /// Delivery by scheduling on any idle thread in the shared pool.
    Pool,
}

impl ExecutionContext {
    /// The context of the calling thread, as a `Worker` — never `Pool`,
    /// even when called from a pool thread (see `§8`: "`current()` on any
    /// pool thread returns a `Worker` context whose thread id equals the
    /// calling OS thread id").
    pub fn current() -> ExecutionContext {
        ExecutionContext::Worker {
            thread: std::thread::current().id(),
        }
    }

    /// A context that posts to the given UI window's message loop, running
    /// on `thread`.
    pub fn from_ui(window: WindowHandle, thread: ThreadId) -> ExecutionContext {
        ExecutionContext::Ui { window, thread }
    }

    /// The shared thread-pool context.
    pub fn pool() -> ExecutionContext {
        ExecutionContext::Pool
    }

    /// True if this context routes to the shared pool.
    pub fn is_pool(&self) -> bool {
        matches!(self, ExecutionContext::Pool)
    }

    /// The thread this context identifies, or `None` for `Pool` (which
    /// names no single thread).
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            ExecutionContext::Ui { thread, .. } => Some(*thread),
            ExecutionContext::Worker { thread } => Some(*thread),
            ExecutionContext::Pool => None,
        }
    }

    /// True if a stage targeting this context, if driven right now, would
    /// run inline on the calling thread (i.e. no cross-thread post is
    /// needed). `Pool` is reachable from any pool worker, but this function
    /// has no way to know whether the calling thread is a pool worker, so
    /// `Pool` contexts always report `false` here and let
    /// [`Dispatcher::post`](crate::dispatch::Dispatcher::post) decide.
    pub fn matches_current_thread(&self) -> bool {
        self.thread() == Some(std::thread::current().id())
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExecutionContext::Pool, ExecutionContext::Pool) => true,
            (ExecutionContext::Pool, _) | (_, ExecutionContext::Pool) => false,
            (a, b) => a.thread() == b.thread(),
        }
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionContext::Ui { window, thread } => f
                .debug_struct("Ui")
                .field("window", window)
                .field("thread", thread)
                .finish(),
            ExecutionContext::Worker { thread } => {
                f.debug_struct("Worker").field("thread", thread).finish()
            }
            ExecutionContext::Pool => f.write_str("Pool"),
        }
    }
}
