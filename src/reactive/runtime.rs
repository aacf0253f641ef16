//! Runtime - the explicit reactive context.
//!
//! Everything that a process-wide reactive system would keep in globals lives
//! here instead: the dep and watcher arenas, the stack of currently evaluating
//! watchers, the observe toggle, the scheduler and the deferred-callback
//! queue. Independent runtimes never see each other's state, which keeps
//! tests and embedded scopes isolated.
//!
//! # Example
//!
//! ```ignore
//! use spark_ui_core::{Runtime, WatchOptions};
//!
//! let rt = Runtime::new();
//! let state = rt.object();
//! state.set("count", 0);
//!
//! let s = state.clone();
//! let _w = rt.watch(
//!     move || Ok(s.get("count")),
//!     |new, old| { println!("{old:?} -> {new:?}"); Ok(()) },
//!     WatchOptions::new(),
//! )?;
//!
//! state.set("count", 1);
//! rt.tick(); // flushes the batched re-run
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use super::array::Array;
use super::computed::Computed;
use super::dep::DepId;
use super::next_tick::{Defer, NextTick, TaskQueue};
use super::object::Object;
use super::scheduler::Scheduler;
use super::value::Value;
use super::watcher::{WatchCallback, WatchOptions, Watcher, WatcherId};
use crate::config::Config;
use crate::error::{Error, Result, Warning};

// =============================================================================
// Runtime State
// =============================================================================

pub(crate) struct RuntimeInner {
    config: RefCell<Config>,

    /// Dep arena: each dep's subscriber set, ascending by watcher id.
    deps: RefCell<HashMap<DepId, BTreeSet<WatcherId>>>,
    next_dep: Cell<u64>,

    /// Watcher arena. A watcher stays here until torn down.
    watchers: RefCell<HashMap<WatcherId, Watcher>>,
    next_watcher: Cell<u64>,

    /// Evaluation stack. `None` entries disable tracking.
    targets: RefCell<Vec<Option<WatcherId>>>,

    /// When false, newly assigned containers are not made reactive.
    observing: Cell<bool>,

    pub(crate) scheduler: Scheduler,
    pub(crate) ticks: NextTick,
}

/// Handle to one reactive context. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Runtime with default config and the built-in task queue as its
    /// deferred-callback primitive. Drive it with [`Runtime::tick`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let queue = Rc::new(TaskQueue::new());
        Self::build(config, queue.clone(), Some(queue))
    }

    /// Runtime that schedules its flushes through a host-provided primitive.
    pub fn with_defer(config: Config, defer: Rc<dyn Defer>) -> Self {
        Self::build(config, defer, None)
    }

    fn build(config: Config, defer: Rc<dyn Defer>, local: Option<Rc<TaskQueue>>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config: RefCell::new(config),
                deps: RefCell::new(HashMap::new()),
                next_dep: Cell::new(1),
                watchers: RefCell::new(HashMap::new()),
                next_watcher: Cell::new(1),
                targets: RefCell::new(Vec::new()),
                observing: Cell::new(true),
                scheduler: Scheduler::new(),
                ticks: NextTick::new(defer, local),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RuntimeInner>) -> Option<Runtime> {
        weak.upgrade().map(|inner| Runtime { inner })
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn ticks(&self) -> &NextTick {
        &self.inner.ticks
    }

    // =========================================================================
    // Config
    // =========================================================================

    /// Snapshot of the current config.
    pub fn config(&self) -> Config {
        self.inner.config.borrow().clone()
    }

    pub fn update_config(&self, f: impl FnOnce(&mut Config)) {
        f(&mut self.inner.config.borrow_mut());
    }

    pub(crate) fn max_update_count(&self) -> u32 {
        self.inner.config.borrow().max_update_count
    }

    pub(crate) fn is_async(&self) -> bool {
        self.inner.config.borrow().async_flush
    }

    // =========================================================================
    // Dep Arena
    // =========================================================================

    pub(crate) fn register_dep(&self) -> DepId {
        let id = DepId(self.inner.next_dep.get());
        self.inner.next_dep.set(id.0 + 1);
        self.inner.deps.borrow_mut().insert(id, BTreeSet::new());
        id
    }

    pub(crate) fn release_dep(&self, id: DepId) {
        // A dep can be dropped while the arena is busy (a value freed inside
        // a notify loop); the stale entry is harmless and skipped.
        if let Ok(mut deps) = self.inner.deps.try_borrow_mut() {
            deps.remove(&id);
        }
    }

    /// Number of live deps.
    pub fn dep_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn subscribers(&self, dep: DepId) -> Vec<WatcherId> {
        self.inner
            .deps
            .borrow()
            .get(&dep)
            .map(|subs| subs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn add_sub(&self, dep: DepId, watcher: WatcherId) {
        if let Some(subs) = self.inner.deps.borrow_mut().get_mut(&dep) {
            subs.insert(watcher);
        }
    }

    pub(crate) fn remove_sub(&self, dep: DepId, watcher: WatcherId) {
        if let Some(subs) = self.inner.deps.borrow_mut().get_mut(&dep) {
            subs.remove(&watcher);
        }
    }

    /// Record `dep` as read by the active watcher, if any.
    pub fn depend(&self, dep: DepId) {
        let Some(target) = self.active_watcher() else {
            return;
        };
        if let Some(watcher) = self.watcher(target) {
            watcher.add_dep(self, dep);
        }
    }

    /// Invalidate every subscriber of `dep`.
    ///
    /// The subscriber list is snapshotted first, so watchers that subscribe
    /// or unsubscribe while being updated do not disturb the iteration.
    pub fn notify(&self, dep: DepId) {
        let subs = self.subscribers(dep);
        for id in subs {
            if let Some(watcher) = self.watcher(id) {
                watcher.update();
            }
        }
    }

    // =========================================================================
    // Watcher Arena
    // =========================================================================

    pub(crate) fn next_watcher_id(&self) -> WatcherId {
        let id = WatcherId(self.inner.next_watcher.get());
        self.inner.next_watcher.set(id.0 + 1);
        id
    }

    pub(crate) fn register_watcher(&self, watcher: Watcher) {
        self.inner.watchers.borrow_mut().insert(watcher.id(), watcher);
    }

    pub(crate) fn unregister_watcher(&self, id: WatcherId) {
        // Removing the arena entry drops a handle; bind it so the drop
        // happens after the borrow is released.
        let removed = self.inner.watchers.borrow_mut().remove(&id);
        drop(removed);
    }

    pub fn watcher(&self, id: WatcherId) -> Option<Watcher> {
        self.inner.watchers.borrow().get(&id).cloned()
    }

    /// Number of live (not torn down) watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    // =========================================================================
    // Evaluation Stack
    // =========================================================================

    pub(crate) fn push_target(&self, target: Option<WatcherId>) {
        self.inner.targets.borrow_mut().push(target);
    }

    pub(crate) fn pop_target(&self) {
        self.inner.targets.borrow_mut().pop();
    }

    /// The watcher currently collecting dependencies.
    pub fn active_watcher(&self) -> Option<WatcherId> {
        self.inner.targets.borrow().last().copied().flatten()
    }

    pub fn is_tracking(&self) -> bool {
        self.active_watcher().is_some()
    }

    /// Run `f` without recording any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.push_target(None);
        let result = f();
        self.pop_target();
        result
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn is_observing(&self) -> bool {
        self.inner.observing.get()
    }

    /// Run `f` with deep observation of newly assigned containers disabled.
    pub fn without_observing<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = self.inner.observing.replace(false);
        let result = f();
        self.inner.observing.set(previous);
        result
    }

    /// Make `value` (and everything reachable from it) reactive in this runtime.
    pub fn observe(&self, value: &Value) {
        if !self.is_observing() {
            return;
        }
        match value {
            Value::Object(object) => object.attach(self),
            Value::Array(array) => array.attach(self),
            _ => {}
        }
    }

    /// Observe `value` and hand it back.
    pub fn reactive(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        self.observe(&value);
        value
    }

    /// A fresh, empty reactive object.
    pub fn object(&self) -> Object {
        let object = Object::new();
        object.attach(self);
        object
    }

    /// A fresh, empty reactive array.
    pub fn array(&self) -> Array {
        let array = Array::new();
        array.attach(self);
        array
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Observe `getter`, invoking `callback(new, old)` when its value changes.
    pub fn watch(
        &self,
        getter: impl Fn() -> anyhow::Result<Value> + 'static,
        callback: impl Fn(&Value, &Value) -> anyhow::Result<()> + 'static,
        options: WatchOptions,
    ) -> Result<Watcher> {
        let immediate = options.immediate;
        let callback: WatchCallback = Rc::new(callback);
        let watcher = Watcher::new(
            self,
            Rc::new(getter),
            Some(callback.clone()),
            WatchOptions { user: true, ..options },
        )?;
        if immediate {
            let value = watcher.value();
            if let Err(source) = self.untracked(|| callback(&value, &Value::Null)) {
                self.report_error(&Error::Callback {
                    expression: watcher.label(),
                    source,
                });
            }
        }
        Ok(watcher)
    }

    /// A lazily evaluated, cached derived value.
    pub fn computed(&self, getter: impl Fn() -> anyhow::Result<Value> + 'static) -> Computed {
        Computed::new(self, Rc::new(getter), None)
    }

    // =========================================================================
    // Deferral
    // =========================================================================

    /// Run `callback` once after the current synchronous work.
    pub fn next_tick(&self, callback: impl FnOnce() + 'static) {
        NextTick::push(self, Box::new(callback));
    }

    /// Drain the built-in task queue, running deferred flushes.
    ///
    /// Returns the number of tasks run. Always zero for runtimes built with
    /// [`Runtime::with_defer`], whose host drives deferral itself.
    pub fn tick(&self) -> usize {
        self.inner.ticks.drain_local()
    }

    /// Flush pending watchers right now instead of waiting for the next tick.
    pub fn flush(&self) {
        if self.inner.scheduler.is_waiting() && !self.inner.scheduler.is_flushing() {
            self.inner.scheduler.flush(self);
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.scheduler.is_flushing()
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Route an uncaptured error to the configured handler.
    pub fn report_error(&self, err: &Error) {
        let handler = self.inner.config.borrow().error_handler.clone();
        match handler {
            Some(handler) => handler(err),
            None => tracing::error!(error = %err, "uncaught error in reactive core"),
        }
    }

    /// Emit a warning unless the runtime is silent.
    pub fn warn(&self, warning: Warning) {
        let (silent, handler) = {
            let config = self.inner.config.borrow();
            (config.silent, config.warn_handler.clone())
        };
        if silent {
            return;
        }
        match handler {
            Some(handler) => handler(&warning),
            None => tracing::warn!("{warning}"),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("deps", &self.dep_count())
            .field("watchers", &self.watcher_count())
            .field("active_watcher", &self.active_watcher())
            .finish()
    }
}
