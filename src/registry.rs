//! Per-thread registry of long-lived "modules" (e.g. the HTTP session),
//! keyed by a process-wide module id assigned lazily the first time each
//! module type is used.
//!
//! Held in a thread-local slot table, so lookup never takes a lock — only
//! the owning thread ever touches its own table. A module survives across
//! the many short callables of one promise chain running in the pool, and
//! is torn down (via [`Module::on_unregister`]) when its thread exits.

use std::any::Any;
use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::{Error, LogicErrorKind};

static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(1);

/// A process-unique id for one module *type*, assigned once on first use.
///
/// Equality of ids is the only way two call sites agree they mean the same
/// module kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ModuleId(u32);

/// A module that can live in the [`registry`](self), with a lifecycle hook
/// run when its owning thread tears down.
pub trait Module: Any {
    /// Called once, on the owning thread, right before the module is
    /// dropped at thread teardown.
    fn on_unregister(&mut self) {}
}

/// Type-erased storage for one registered module: exposes the bits
/// `teardown_current_thread` and `unregister` need without knowing the
/// concrete module type.
trait ModuleEntry: Any {
    fn on_unregister(&mut self);
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Module> ModuleEntry for T {
    fn on_unregister(&mut self) {
        Module::on_unregister(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn module_id_of<T: 'static>() -> ModuleId {
    static TABLE: Lazy<Mutex<HashMap<TypeId, ModuleId>>> = Lazy::new(|| Mutex::new(HashMap::new()));
    let mut table = TABLE.lock().expect("module id table poisoned");
    *table
        .entry(TypeId::of::<T>())
        .or_insert_with(|| ModuleId(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed)))
}

thread_local! {
    static SLOTS: RefCell<HashMap<ModuleId, Box<dyn ModuleEntry>>> = RefCell::new(HashMap::new());
}

/// Register `instance` in this thread's slot for type `T`.
///
/// Fails with [`LogicErrorKind::AlreadyRegistered`] if this thread already
/// holds a module of type `T`.
pub fn register<T: Module + 'static>(instance: T) -> Result<(), Error> {
    let id = module_id_of::<T>();
    SLOTS.with(|slots| {
        let mut slots = slots.borrow_mut();
        if slots.contains_key(&id) {
            return Err(Error::logic(LogicErrorKind::AlreadyRegistered));
        }
        slots.insert(id, Box::new(instance));
        Ok(())
    })
}

/// Run `f` with a reference to this thread's module of type `T`, if any.
///
/// Constant-time lookup; borrows the slot table only for the duration of
/// `f`, so `f` must not re-enter the registry for the same thread.
pub fn with<T: Module + 'static, R>(f: impl FnOnce(Option<&T>) -> R) -> R {
    let id = module_id_of::<T>();
    SLOTS.with(|slots| {
        let slots = slots.borrow();
        let module = slots
            .get(&id)
            .and_then(|b| (b.as_ref() as &dyn Any).downcast_ref::<T>());
        f(module)
    })
}

/// Remove this thread's module of type `T`, if present, without running its
/// teardown hook (the caller now owns it).
pub fn unregister<T: Module + 'static>() -> Option<Box<T>> {
    let id = module_id_of::<T>();
    SLOTS.with(|slots| {
        slots
            .borrow_mut()
            .remove(&id)
            .and_then(|entry| entry.into_any().downcast::<T>().ok())
    })
}

/// Run `on_unregister` on every module still held by this thread, then drop
/// them in arbitrary order. Call this once, from the thread that is about
/// to exit its message pump for good.
pub fn teardown_current_thread() {
    let modules = SLOTS.with(|slots| slots.borrow_mut().drain().map(|(_, v)| v).collect::<Vec<_>>());
    for mut module in modules {
        module.on_unregister();
    }
}
