//! The dispatcher and message pump layer: per-thread loops consuming
//! inbound invocations, posting a callable to a target context, and
//! spawning pool workers.
//!
//! A dedicated thread hosts a run loop fed by an `mpsc` channel and stays
//! alive for as long as something keeps posting to it — the same shape as
//! a `Worker` context here, generalized to many concurrent clients
//! instead of one.

mod pool;
mod pump;

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::context::ExecutionContext;

pub use pump::MessagePump;
use pump::{Message, PumpSender};

/// A one-shot unit of work: runs once, then is dropped. Ownership
/// transfers to whoever posts it.
pub struct Callable {
    f: Box<dyn FnOnce() + Send>,
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callable").finish_non_exhaustive()
    }
}

impl Callable {
    /// Wrap a closure as a one-shot callable.
    pub fn new<F>(f: F) -> Callable
    where
        F: FnOnce() + Send + 'static,
    {
        Callable { f: Box::new(f) }
    }

    /// Run the callable, consuming it.
    pub fn invoke(self) {
        (self.f)()
    }
}

/// A long-lived unit of work tied to a dedicated worker thread: `on_enter`
/// sets up (the worker now exists *for* this callable), `on_terminated`
/// aborts without a worker, `on_cleanup` releases resources after the
/// produced value has been delivered.
pub trait AsyncCallable: Send {
    /// Called on the worker thread once it has started pumping for this
    /// callable. `dispatcher` lets the callable post further work — most
    /// notably `QUIT` to its own thread once it resolves.
    fn on_enter(&mut self, dispatcher: Dispatcher);

    /// Called instead of `on_enter` if no worker could be obtained for this
    /// callable (e.g. it arrived after its destination thread already quit).
    fn on_terminated(&mut self) {}

    /// Called after the callable's produced value has been delivered, to
    /// release whatever the dedicated worker was holding.
    fn on_cleanup(&mut self) {}
}

struct Registered {
    tx: PumpSender,
}

struct Inner {
    // Named worker and UI threads that have an active message pump,
    // keyed by the `ThreadId` their `ExecutionContext` names.
    threads: Mutex<HashMap<ThreadId, Registered>>,
    pool: pool::Pool,
    pool_size: usize,
}

/// Posts callables to execution contexts and spawns pool workers.
///
/// Cheap to clone: it is a handle around a shared registry of per-thread
/// queues plus the shared pool, meant to be cloned freely down a call
/// stack.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool_size", &self.inner.pool_size)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with a shared pool of `pool_size` worker
    /// threads.
    pub fn new(pool_size: usize) -> Dispatcher {
        Dispatcher {
            inner: Arc::new(Inner {
                threads: Mutex::new(HashMap::new()),
                pool: pool::Pool::new(pool_size.max(1)),
                pool_size: pool_size.max(1),
            }),
        }
    }

    /// A dispatcher sized to the available parallelism, the same default
    /// every general-purpose pool in the pack reaches for.
    pub fn shared() -> Dispatcher {
        let size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Dispatcher::new(size)
    }

    /// Start a message pump on the calling thread and register it as a
    /// `Worker`/`Ui` destination under `std::thread::current().id()`. The
    /// returned context can be handed out to other chains so they can post
    /// back to this thread; the returned pump must be `.run()` to actually
    /// service it.
    pub fn spawn_pump_here(&self) -> (ExecutionContext, MessagePump) {
        let thread_id = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        self.inner
            .threads
            .lock()
            .expect("dispatcher registry poisoned")
            .insert(thread_id, Registered { tx });
        (
            ExecutionContext::Worker { thread: thread_id },
            MessagePump::new(thread_id, rx, self.clone()),
        )
    }

    /// Spawn a brand-new dedicated OS thread running a message pump,
    /// returning the `Worker` context that names it. The thread runs until
    /// it receives `QUIT`.
    pub fn spawn_worker_thread(&self, name: &str) -> ExecutionContext {
        let (tx, rx) = mpsc::channel();
        let dispatcher = self.clone();
        let builder = thread::Builder::new().name(name.to_string());
        let handle = builder
            .spawn(move || {
                let thread_id = std::thread::current().id();
                let pump = MessagePump::new(thread_id, rx, dispatcher.clone());
                pump.run();
                dispatcher.forget_thread(thread_id);
            })
            .expect("failed to spawn dedicated worker thread");
        let thread_id = handle.thread().id();
        self.inner
            .threads
            .lock()
            .expect("dispatcher registry poisoned")
            .insert(thread_id, Registered { tx });
        ExecutionContext::Worker { thread: thread_id }
    }

    fn forget_thread(&self, thread_id: ThreadId) {
        self.inner
            .threads
            .lock()
            .expect("dispatcher registry poisoned")
            .remove(&thread_id);
    }

    /// Post a one-shot [`Callable`] to `ctx`.
    ///
    /// - `Worker`/`Ui` → enqueued on that thread's pump.
    /// - `Pool` → scheduled on the shared pool.
    ///
    /// If `ctx` names a thread with no registered pump (it never started
    /// one, or has already quit), the callable is dropped; callers that
    /// need a guarantee should keep the owning thread's pump alive for as
    /// long as they can post to it.
    pub fn post(&self, callable: Callable, ctx: ExecutionContext) {
        match ctx {
            ExecutionContext::Pool => self.inner.pool.schedule(callable),
            ExecutionContext::Worker { thread } | ExecutionContext::Ui { thread, .. } => {
                self.post_to_thread(Message::Callable(callable), thread);
            }
        }
    }

    /// Post a long-lived [`AsyncCallable`] to `ctx`.
    ///
    /// - `Worker`/`Ui` → enqueued on that thread's existing pump, which
    ///   calls `on_enter` and keeps pumping (it already runs a full loop).
    /// - `Pool` → a *dedicated* worker thread is spawned to host it,
    ///   running a full pump loop that exits only once the callable's work
    ///   settles and posts `QUIT` to its own (newly named) context.
    pub fn post_async(&self, callable: Box<dyn AsyncCallable>, ctx: ExecutionContext) {
        match ctx {
            ExecutionContext::Pool => {
                let worker_ctx = self.spawn_worker_thread("pledge-async-task");
                if let ExecutionContext::Worker { thread } = worker_ctx {
                    self.post_to_thread(Message::AsyncCallable(callable), thread);
                }
            }
            ExecutionContext::Worker { thread } | ExecutionContext::Ui { thread, .. } => {
                self.post_to_thread(Message::AsyncCallable(callable), thread);
            }
        }
    }

    /// Post `QUIT` to `ctx`'s thread, asking its pump to drain and stop.
    /// A no-op for `Pool` (the pool's workers are shared and never quit
    /// individually via this call).
    pub fn quit(&self, ctx: ExecutionContext) {
        if let ExecutionContext::Worker { thread } | ExecutionContext::Ui { thread, .. } = ctx {
            self.post_to_thread(Message::Quit, thread);
        }
    }

    fn post_to_thread(&self, message: Message, thread: ThreadId) {
        let threads = self.inner.threads.lock().expect("dispatcher registry poisoned");
        if let Some(registered) = threads.get(&thread) {
            if registered.tx.send(message).is_err() {
                log::warn!("({thread:?}) pump receiver dropped; message undelivered");
            }
        } else {
            log::warn!("({thread:?}) no pump registered for this context; message dropped");
        }
    }
}
