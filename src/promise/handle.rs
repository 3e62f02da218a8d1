//! The public promise-chain handles: [`Promise<T>`] is the
//! producing end a chain is built and started through; [`Promisee<T>`] is
//! the matching capability an [`crate::task::AsyncTask`] holds to resolve
//! or reject its node once its work completes, from whatever thread that
//! turns out to be.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::error::Error;

use super::node::{AnyValue, Arrival, Chain, Node, StageFn};
use super::stage::{functor_pair, Handler, Kind};

/// A promise chain's producing end.
///
/// Created by [`crate::task::run_task`]/[`crate::task::run_async_task`],
/// extended with [`Promise::then`]/[`Promise::then_handler`], and consumed
/// by [`Promise::done`]. Each `.then()` call moves `self`, so a given tail
/// node can only ever be extended once through this API.
pub struct Promise<T> {
    chain: Arc<Chain>,
    tail: Arc<Node>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Promise<T> {
    pub(crate) fn from_root(dispatcher: Dispatcher, ctx: ExecutionContext, stage: StageFn) -> Promise<T> {
        let root = Node::new(ctx, stage);
        let chain = Chain::new(Arc::clone(&root), dispatcher);
        Promise {
            chain,
            tail: root,
            _marker: PhantomData,
        }
    }

    /// Append a functor-pair stage targeting `ctx`. Exactly one
    /// of `success`/`exception` fires; the stage always produces a `U`.
    pub fn then<U, F, E>(self, ctx: ExecutionContext, success: F, exception: E) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        E: FnOnce(Error) -> U + Send + 'static,
    {
        self.then_kind(ctx, functor_pair(success, exception))
    }

    /// Append a handler-object stage targeting `ctx`. Unlike a
    /// functor pair, `handler` may itself raise, and its `on_completed` is
    /// called if this stage ends up at the chain's tail.
    pub fn then_handler<U>(self, ctx: ExecutionContext, handler: impl Handler<T, U> + 'static) -> Promise<U>
    where
        U: Send + 'static,
    {
        self.then_kind(ctx, Kind::Handler(Box::new(handler)))
    }

    fn then_kind<U: Send + 'static>(self, ctx: ExecutionContext, kind: Kind<T, U>) -> Promise<U> {
        let stage: StageFn = Box::new(move |input, is_tail, _node, _dispatcher| -> Arrival {
            let typed_input: Result<T, Error> = match input {
                Ok(value) => Ok(*downcast::<T>(value)),
                Err(error) => Err(error),
            };
            kind.invoke(typed_input, is_tail)
                .map(|value| Box::new(value) as AnyValue)
        });
        let next = Node::new(ctx, stage);
        self.tail.set_next(Arc::clone(&next));
        Promise {
            chain: self.chain,
            tail: next,
            _marker: PhantomData,
        }
    }

    /// Start the chain's root node running. Fatal to this chain
    /// (`LogicErrorKind::AlreadyStarted`) if already started — a
    /// programming error, since nothing in this crate calls `done` more
    /// than once on the same chain.
    pub fn done(self) -> crate::Result<()> {
        self.chain.start()
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").field("tail", &self.tail.ctx).finish()
    }
}

fn downcast<T: 'static>(value: AnyValue) -> Box<T> {
    value
        .downcast::<T>()
        .unwrap_or_else(|_| panic!("promise chain type mismatch across a node boundary"))
}

/// A promise chain node's resolving capability, held by an
/// [`crate::task::AsyncTask`] between `on_enter` and whenever its work
/// finishes.
///
/// Cloning shares the same node: only the first `resolve`/`reject` among
/// all clones takes effect ("first write wins"); later calls are silently
/// ignored, as if every clone only ever targets the same empty slot.
pub struct Promisee<T> {
    node: Arc<Node>,
    dispatcher: Dispatcher,
    fired: Arc<AtomicBool>,
    on_settled: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + 'static> Promisee<T> {
    /// Build a `Promisee` targeting `node`, marking it deferred so the
    /// engine knows not to treat the stage procedure's return value as the
    /// real outcome. `on_settled` runs exactly once, after the first
    /// resolve/reject delivers — used by the task adapter to quit its
    /// dedicated worker thread.
    pub(crate) fn new(
        node: Arc<Node>,
        dispatcher: Dispatcher,
        on_settled: Box<dyn FnOnce() + Send>,
    ) -> Promisee<T> {
        node.mark_deferred();
        Promisee {
            node,
            dispatcher,
            fired: Arc::new(AtomicBool::new(false)),
            on_settled: Arc::new(Mutex::new(Some(on_settled))),
            _marker: PhantomData,
        }
    }

    /// Resolve with `value`, delivering it to the next node (if any).
    pub fn resolve(&self, value: T) {
        self.settle(Ok(Box::new(value)))
    }

    /// Reject with `error`, delivering it to the next node (if any).
    pub fn reject(&self, error: Error) {
        self.settle(Err(error))
    }

    fn settle(&self, output: Arrival) {
        if self.fired.swap(true, Ordering::SeqCst) {
            log::warn!("promisee resolved or rejected more than once; ignoring");
            return;
        }
        self.node.deliver(output, self.dispatcher.clone());
        if let Some(on_settled) = self
            .on_settled
            .lock()
            .expect("promisee settle hook poisoned")
            .take()
        {
            on_settled();
        }
    }
}

impl<T> std::fmt::Debug for Promisee<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promisee")
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T> Clone for Promisee<T> {
    fn clone(&self) -> Promisee<T> {
        Promisee {
            node: Arc::clone(&self.node),
            dispatcher: self.dispatcher.clone(),
            fired: Arc::clone(&self.fired),
            on_settled: Arc::clone(&self.on_settled),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn root_stage<T: Send + 'static>(value: T) -> StageFn {
        Box::new(move |_input, _is_tail, _node, _dispatcher| Ok(Box::new(value) as AnyValue))
    }

    #[test]
    fn then_chains_functor_pairs_in_order() {
        let dispatcher = Dispatcher::new(1);
        let (tx, rx) = mpsc::channel();
        let promise: Promise<u32> = Promise::from_root(dispatcher, ExecutionContext::pool(), root_stage(1u32));
        let promise = promise.then(ExecutionContext::pool(), |v| v + 1, |_e| 0);
        let promise = promise.then(ExecutionContext::pool(), move |v| tx.send(v).unwrap(), |_e| ());
        promise.done().unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 2);
    }

    #[test]
    fn exception_skips_to_exception_branch() {
        let dispatcher = Dispatcher::new(1);
        let stage: StageFn = Box::new(|_input, _is_tail, _node, _dispatcher| {
            Err(Error::connection_terminated())
        });
        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        let promise: Promise<u32> = Promise::from_root(dispatcher, ExecutionContext::pool(), stage);
        let promise = promise.then(
            ExecutionContext::pool(),
            move |_v| tx.send("success").unwrap(),
            move |_e| tx2.send("exception").unwrap(),
        );
        promise.done().unwrap();
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), "exception");
    }

    #[test]
    fn double_done_is_already_started() {
        let dispatcher = Dispatcher::new(1);
        let root = Node::new(ExecutionContext::pool(), root_stage(1u32));
        let chain = Chain::new(root, dispatcher);
        chain.start().unwrap();
        let err = chain.start().unwrap_err();
        assert_eq!(err.logic_kind(), Some(crate::LogicErrorKind::AlreadyStarted));
    }
}
