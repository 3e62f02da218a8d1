//! The reference-counted node of a promise chain.
//!
//! Type erasure, not generics threaded end to end, is how one node hands a
//! differently-typed value to the next. Every node's produced value is
//! boxed as `Box<dyn Any + Send>`; the closure built by
//! [`crate::promise::handle::Promise::then`] is the only place that knows
//! the concrete types on either side of one hop.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::dispatch::{Callable, Dispatcher};
use crate::error::{Error, LogicErrorKind};

pub(crate) type AnyValue = Box<dyn Any + Send>;

/// What arrives at a node: either the previous stage's value, or an
/// exception it raised. Exception ownership moves with this enum — it is
/// held by whichever node currently has it, until a stage consumes it or it
/// is dropped at the tail.
pub(crate) type Arrival = Result<AnyValue, Error>;

/// The stage procedure, already specialized by `then()`/`run_task()` to
/// accept `Arrival` and the `is_tail` flag and produce the next `Arrival`.
/// Runs at most once; `Node::stage` takes it out of its slot on the one
/// and only invocation.
///
/// Also receives the node it is running as and the dispatcher driving it,
/// so an `AsyncTask` stage can build a [`crate::promise::Promisee`] that
/// targets this very node and mark it deferred before returning.
pub(crate) type StageFn =
    Box<dyn FnOnce(Arrival, bool, &Arc<Node>, &Dispatcher) -> Arrival + Send>;

pub(crate) struct Node {
    pub(crate) ctx: ExecutionContext,
    stage: Mutex<Option<StageFn>>,
    next: Mutex<Option<Arc<Node>>>,
    /// Set when an `AsyncTask` stage has stashed a `Promisee` instead of
    /// producing a result synchronously; delivery will happen later, from
    /// whatever thread calls `resolve`/`reject`.
    deferred: AtomicBool,
}

impl Node {
    pub(crate) fn new(ctx: ExecutionContext, stage: StageFn) -> Arc<Node> {
        Arc::new(Node {
            ctx,
            stage: Mutex::new(Some(stage)),
            next: Mutex::new(None),
            deferred: AtomicBool::new(false),
        })
    }

    /// Appends `next` as this node's only continuation. Structurally this
    /// can only be called once per node in practice: `Promise::then`
    /// consumes the `Promise<T>` handle that is the sole means of reaching
    /// a given tail, so there is no safe way to call it twice on the same
    /// node through the public API. The explicit guard below exists anyway
    /// because the invariant ("a node has at most one next handler") is
    /// load-bearing and cheap to assert.
    pub(crate) fn set_next(&self, next: Arc<Node>) {
        let mut slot = self.next.lock().expect("node.next poisoned");
        assert!(slot.is_none(), "a promise node can only have one next handler");
        *slot = Some(next);
    }

    pub(crate) fn is_tail(&self) -> bool {
        self.next.lock().expect("node.next poisoned").is_none()
    }

    /// Marks this node as awaiting an async resolution rather than an
    /// immediate return value. `deliver` (called later by a `Promisee`)
    /// will carry the eventual `Arrival` onward.
    pub(crate) fn mark_deferred(&self) {
        self.deferred.store(true, Ordering::SeqCst);
    }

    /// Drive this node: if the calling thread doesn't already match `ctx`,
    /// post a callable that re-enters `run` on the right thread. Otherwise
    /// run the stage procedure inline.
    ///
    /// A `Pool`-targeted node always posts, even when the calling thread
    /// happens to be a pool worker: only `Dispatcher::post` knows the pool's
    /// membership, so routing every `Pool` hop through it (rather than
    /// assuming "currently running" implies "a pool worker") is what
    /// actually keeps a node's stage confined to `pool::Pool`'s bounded
    /// thread set.
    pub(crate) fn run(self: Arc<Node>, input: Arrival, dispatcher: Dispatcher) {
        if self.ctx.matches_current_thread() {
            self.run_inline(input, dispatcher);
        } else {
            let node = self;
            let ctx = node.ctx;
            let dispatcher_for_post = dispatcher.clone();
            dispatcher.post(
                Callable::new(move || node.run_inline(input, dispatcher_for_post)),
                ctx,
            );
        }
    }

    fn run_inline(self: Arc<Node>, input: Arrival, dispatcher: Dispatcher) {
        let is_tail = self.is_tail();
        let stage = {
            let mut slot = self.stage.lock().expect("node.stage poisoned");
            slot.take()
        };
        let Some(stage) = stage else {
            log::warn!("promise node driven more than once; ignoring");
            return;
        };

        let output = stage(input, is_tail, &self, &dispatcher);

        if self.deferred.load(Ordering::SeqCst) {
            // An AsyncTask stashed a Promisee; it will call `deliver` from
            // whatever thread resolves/rejects it. `output` here is a
            // placeholder the stage closure returns to satisfy its
            // signature and carries no meaning.
            return;
        }

        self.deliver(output, dispatcher);
    }

    /// Carry `output` to the next node, if any, posting across a context
    /// hop as needed. Called either synchronously from `run_inline`, or
    /// later by a `Promisee` once an `AsyncTask` resolves/rejects.
    pub(crate) fn deliver(&self, output: Arrival, dispatcher: Dispatcher) {
        let next = self.next.lock().expect("node.next poisoned").clone();
        if let Some(next) = next {
            next.run(output, dispatcher);
        }
        // No next handler: the result (or exception) is discarded here.
        // Stage kinds that care about terminal delivery
        // (the `Handler` kind's `on_completed`/`on_exception`) already
        // observed `is_tail` inside the stage procedure itself.
    }
}

/// Chain-wide state shared by every `Promise`/`Promisee` handle still
/// reachable from it: the root node (the only thing that truly owns the
/// forward chain) and a start-once guard. Cloning a handle's `Arc<Chain>`
/// is exactly "each node adds a ref to the chain head"; forward links
/// between nodes are a separate, non-cyclic `Arc` chain, so the two
/// refcounts never form a cycle.
pub(crate) struct Chain {
    root: Arc<Node>,
    started: AtomicBool,
    pub(crate) dispatcher: Dispatcher,
}

impl Chain {
    pub(crate) fn new(root: Arc<Node>, dispatcher: Dispatcher) -> Arc<Chain> {
        Arc::new(Chain {
            root,
            started: AtomicBool::new(false),
            dispatcher,
        })
    }

    /// Start the chain head exactly once. A second call is a programming
    /// error (`LogicErrorKind::AlreadyStarted`), fatal to this chain but
    /// not to others.
    pub(crate) fn start(&self) -> Result<(), Error> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::logic(LogicErrorKind::AlreadyStarted));
        }
        let root = Arc::clone(&self.root);
        root.run(Ok(Box::new(())), self.dispatcher.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_stage() -> StageFn {
        Box::new(|input, _is_tail, _node, _dispatcher| input)
    }

    #[test]
    fn double_start_is_logic_error() {
        let root = Node::new(ExecutionContext::current(), noop_stage());
        let chain = Chain::new(root, Dispatcher::new(1));
        chain.start().unwrap();
        let err = chain.start().unwrap_err();
        assert_eq!(err.logic_kind(), Some(LogicErrorKind::AlreadyStarted));
    }

    #[test]
    fn set_next_twice_panics() {
        let root = Node::new(ExecutionContext::current(), noop_stage());
        let a = Node::new(ExecutionContext::current(), noop_stage());
        let b = Node::new(ExecutionContext::current(), noop_stage());
        root.set_next(a);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| root.set_next(b)));
        assert!(result.is_err());
    }
}
