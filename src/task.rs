//! Task adapters: the two ways a promise chain gets its first value — a
//! synchronous [`Task`] run inline on its target context, or an
//! [`AsyncTask`] that owns a dedicated worker thread for as long as it
//! takes to resolve.
//!
//! An `AsyncTask` spawns (or reuses) a thread, runs work to completion on
//! it, and forwards the result back by resolving or rejecting its
//! [`Promisee`] whenever the work is actually done — the same two-phase
//! shape as a thread that runs a future and posts its output back over a
//! channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::dispatch::{AsyncCallable, Dispatcher};
use crate::promise::{AnyValue, Arrival, Node, Promise, Promisee, StageFn};

/// A synchronous unit of work that produces a `T` or fails, run inline on
/// its target execution context by the chain's root node.
pub trait Task<T>: Send {
    /// Run the task, consuming it. A returned `Err` becomes the root
    /// node's exception, exactly as if a stage procedure further down the
    /// chain had raised one.
    fn run(self: Box<Self>) -> crate::Result<T>;
}

impl<T, F> Task<T> for F
where
    F: FnOnce() -> crate::Result<T> + Send,
{
    fn run(self: Box<Self>) -> crate::Result<T> {
        (*self)()
    }
}

/// Start a chain whose root runs `task` inline on `ctx`.
pub fn run_task<T>(
    dispatcher: Dispatcher,
    ctx: ExecutionContext,
    task: impl Task<T> + 'static,
) -> Promise<T>
where
    T: Send + 'static,
{
    let task: Box<dyn Task<T>> = Box::new(task);
    let stage: StageFn = Box::new(move |_input, _is_tail, _node, _dispatcher| -> Arrival {
        task.run().map(|value| Box::new(value) as AnyValue)
    });
    Promise::from_root(dispatcher, ctx, stage)
}

/// A long-lived unit of work that owns a dedicated worker thread between
/// `on_enter` and whichever of its [`Promisee`]'s `resolve`/`reject` fires
/// first.
pub trait AsyncTask<T>: Send {
    /// Called once the dedicated worker thread's pump is running.
    /// `promisee` is this task's only way to deliver a result; `dispatcher`
    /// lets it post further work (e.g. spawn helper threads, post back to
    /// the pool).
    fn on_enter(&mut self, dispatcher: Dispatcher, promisee: Promisee<T>);

    /// Called instead of `on_enter` if no worker thread could be started
    /// for this task (its destination named thread already quit).
    fn on_terminated(&mut self) {}

    /// Called exactly once, after this task's `Promisee` resolves or
    /// rejects, to release whatever the task itself is holding open (a
    /// connection, a file handle) independently of the worker thread's own
    /// teardown.
    fn on_cleanup(&mut self) {}
}

struct TaskAdapter<T> {
    task: Arc<Mutex<Option<Box<dyn AsyncTask<T>>>>>,
    node: Arc<Node>,
}

impl<T: Send + 'static> AsyncCallable for TaskAdapter<T> {
    fn on_enter(&mut self, dispatcher: Dispatcher) {
        // `ExecutionContext::current()` here names the dedicated worker
        // thread the dispatcher just spawned (or the named thread this
        // callable was posted to) — this callable's own identity, good
        // enough to `quit()` once the task resolves.
        let self_ctx = ExecutionContext::current();
        let dispatcher_for_quit = dispatcher.clone();
        let task_for_cleanup = Arc::clone(&self.task);
        // Set if `on_settled` fires reentrantly, from inside the
        // `task.on_enter(...)` call below (a task that resolves its
        // `Promisee` synchronously, before returning). In that case the
        // task is still out of `self.task`'s slot — `take()` below finds
        // nothing — so the flag tells the call site to run cleanup itself
        // once `on_enter` returns and hands the task back.
        let settled_before_return = Arc::new(AtomicBool::new(false));
        let settled_before_return_for_settle = Arc::clone(&settled_before_return);
        let promisee = Promisee::new(
            Arc::clone(&self.node),
            dispatcher.clone(),
            Box::new(move || {
                match task_for_cleanup.lock().expect("async task mutex poisoned").take() {
                    Some(mut task) => task.on_cleanup(),
                    None => settled_before_return_for_settle.store(true, Ordering::SeqCst),
                }
                dispatcher_for_quit.quit(self_ctx);
            }),
        );

        let mut task = self
            .task
            .lock()
            .expect("async task mutex poisoned")
            .take()
            .expect("async task entered more than once");
        task.on_enter(dispatcher, promisee);

        if settled_before_return.load(Ordering::SeqCst) {
            task.on_cleanup();
        } else {
            *self.task.lock().expect("async task mutex poisoned") = Some(task);
        }
    }

    fn on_terminated(&mut self) {
        if let Some(mut task) = self.task.lock().expect("async task mutex poisoned").take() {
            task.on_terminated();
        }
    }
}

/// Start a chain whose root hands off to `task` on a worker thread
/// dedicated to it (freshly spawned if `ctx` is [`ExecutionContext::pool`],
/// reused if `ctx` already names a running pump).
pub fn run_async_task<T>(
    dispatcher: Dispatcher,
    ctx: ExecutionContext,
    task: impl AsyncTask<T> + 'static,
) -> Promise<T>
where
    T: Send + 'static,
{
    let task: Box<dyn AsyncTask<T>> = Box::new(task);
    let task = Arc::new(Mutex::new(Some(task)));
    let stage: StageFn = Box::new(move |_input, _is_tail, node, dispatcher| -> Arrival {
        // Mark deferred *here*, synchronously, before `post_async` returns
        // control to `run_inline` — `TaskAdapter::on_enter` runs later, on
        // whatever thread ends up hosting it, and would be too late.
        node.mark_deferred();
        let adapter = TaskAdapter {
            task,
            node: Arc::clone(node),
        };
        dispatcher.post_async(Box::new(adapter), ctx);
        Ok(Box::new(()) as AnyValue)
    });
    Promise::from_root(dispatcher, ExecutionContext::current(), stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn run_task_delivers_value() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let promise = run_task(dispatcher, ExecutionContext::pool(), || Ok(7u32));
        let promise = promise.then(ExecutionContext::pool(), move |v| tx.send(v).unwrap(), |_e| ());
        promise.done().unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn run_task_error_reaches_exception_branch() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        let promise = run_task::<u32>(dispatcher, ExecutionContext::pool(), || {
            Err(crate::Error::connection_terminated())
        });
        let promise = promise.then(
            ExecutionContext::pool(),
            move |_v| tx.send("ok").unwrap(),
            move |_e| tx2.send("err").unwrap(),
        );
        promise.done().unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), "err");
    }

    struct Echo(u32);

    impl AsyncTask<u32> for Echo {
        fn on_enter(&mut self, _dispatcher: Dispatcher, promisee: Promisee<u32>) {
            let value = self.0;
            std::thread::spawn(move || promisee.resolve(value));
        }
    }

    #[test]
    fn run_async_task_resolves_from_background_thread() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let promise = run_async_task(dispatcher, ExecutionContext::pool(), Echo(99));
        let promise = promise.then(ExecutionContext::pool(), move |v| tx.send(v).unwrap(), |_e| 0);
        promise.done().unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 99);
    }

    struct EchoWithCleanup {
        value: u32,
        cleaned_up: mpsc::Sender<()>,
    }

    impl AsyncTask<u32> for EchoWithCleanup {
        fn on_enter(&mut self, _dispatcher: Dispatcher, promisee: Promisee<u32>) {
            let value = self.value;
            std::thread::spawn(move || promisee.resolve(value));
        }

        fn on_cleanup(&mut self) {
            let _ = self.cleaned_up.send(());
        }
    }

    #[test]
    fn on_cleanup_runs_after_async_resolution_from_another_thread() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let (cleanup_tx, cleanup_rx) = mpsc::channel();
        let promise = run_async_task(
            dispatcher,
            ExecutionContext::pool(),
            EchoWithCleanup { value: 1, cleaned_up: cleanup_tx },
        );
        let promise = promise.then(ExecutionContext::pool(), move |v| tx.send(v).unwrap(), |_e| 0);
        promise.done().unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        cleanup_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    }

    struct SyncSettle {
        cleaned_up: mpsc::Sender<()>,
    }

    impl AsyncTask<u32> for SyncSettle {
        fn on_enter(&mut self, _dispatcher: Dispatcher, promisee: Promisee<u32>) {
            // Resolves inline, before returning, unlike `Echo`'s spawned
            // thread — exercises the reentrant `on_settled` path.
            promisee.resolve(2);
        }

        fn on_cleanup(&mut self) {
            let _ = self.cleaned_up.send(());
        }
    }

    #[test]
    fn on_cleanup_runs_once_when_task_settles_synchronously() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let (cleanup_tx, cleanup_rx) = mpsc::channel();
        let promise = run_async_task(
            dispatcher,
            ExecutionContext::pool(),
            SyncSettle { cleaned_up: cleanup_tx },
        );
        let promise = promise.then(ExecutionContext::pool(), move |v| tx.send(v).unwrap(), |_e| 0);
        promise.done().unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        cleanup_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(cleanup_rx.try_recv().is_err(), "on_cleanup must run exactly once");
    }
}
