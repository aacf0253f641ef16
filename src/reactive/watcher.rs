//! Watcher - a computation node in the dependency graph.
//!
//! A watcher wraps a tracked function (the getter). Each evaluation pushes the
//! watcher onto the runtime's evaluation stack, so every reactive read made by
//! the getter subscribes the watcher to that field's dep. After the getter
//! returns, the new dependency set replaces the old one: deps that were not
//! read this time are unsubscribed. Conditional reads therefore never leave
//! stale subscriptions behind.
//!
//! # Modes
//!
//! | Flag     | Behavior on invalidation                                |
//! |----------|---------------------------------------------------------|
//! | (none)   | queued on the scheduler, re-run in the next flush       |
//! | `LAZY`   | only marked dirty; re-evaluated on the next read        |
//! | `SYNC`   | re-run immediately                                      |
//! | `USER`   | getter errors are reported instead of propagated        |
//! | `DEEP`   | the value is traversed so nested fields are tracked too |
//! | `RENDER` | drives a component's render/patch cycle                 |

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use super::dep::DepId;
use super::observer::traverse;
use super::runtime::{Runtime, RuntimeInner};
use super::value::Value;
use crate::error::{Error, Result};

/// Unique, monotonically increasing watcher identifier. Creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(pub(crate) u64);

impl WatcherId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Watcher mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WatcherFlags: u8 {
        const LAZY = 1 << 0;
        const SYNC = 1 << 1;
        const USER = 1 << 2;
        const DEEP = 1 << 3;
        const RENDER = 1 << 4;
    }
}

/// Tracked function.
pub type Getter = Rc<dyn Fn() -> anyhow::Result<Value>>;

/// Change callback, receives `(new, old)`.
pub type WatchCallback = Rc<dyn Fn(&Value, &Value) -> anyhow::Result<()>>;

/// Plain hook without arguments.
pub type HookFn = Rc<dyn Fn()>;

// =============================================================================
// Change Policy
// =============================================================================

/// Decides whether a re-evaluated value counts as a change.
#[derive(Clone, Default)]
pub enum ChangePolicy {
    /// Fire when the value is not the same value, or is a container (which
    /// may have been mutated in place), or the watcher is deep.
    #[default]
    Default,
    /// Fire only when the value is not the same value. Containers compare by
    /// identity.
    Identity,
    /// Fire when the value differs structurally.
    Structural,
    /// Fire on every re-evaluation.
    Always,
    /// Caller-supplied predicate, receives `(old, new)`.
    Custom(Rc<dyn Fn(&Value, &Value) -> bool>),
}

impl ChangePolicy {
    pub fn changed(&self, old: &Value, new: &Value, deep: bool) -> bool {
        match self {
            ChangePolicy::Default => !new.same(old) || new.is_container() || deep,
            ChangePolicy::Identity => !new.same(old),
            ChangePolicy::Structural => !new.deep_eq(old),
            ChangePolicy::Always => true,
            ChangePolicy::Custom(changed) => changed(old, new),
        }
    }
}

impl fmt::Debug for ChangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangePolicy::Default => f.write_str("Default"),
            ChangePolicy::Identity => f.write_str("Identity"),
            ChangePolicy::Structural => f.write_str("Structural"),
            ChangePolicy::Always => f.write_str("Always"),
            ChangePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// =============================================================================
// Options
// =============================================================================

/// Construction options for a [`Watcher`].
#[derive(Clone, Default)]
pub struct WatchOptions {
    pub deep: bool,
    pub sync: bool,
    pub lazy: bool,
    pub user: bool,
    pub render: bool,
    /// Invoke the callback once right after creation (`Runtime::watch` only).
    pub immediate: bool,
    /// Runs right before the scheduler re-runs this watcher.
    pub before: Option<HookFn>,
    /// Runs after the flush that re-ran this watcher completes.
    pub after_flush: Option<HookFn>,
    /// Overrides the runtime's default dirty-check policy.
    pub change_policy: Option<ChangePolicy>,
    /// Label used in diagnostics.
    pub label: Option<Rc<str>>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn after_flush(mut self, hook: impl Fn() + 'static) -> Self {
        self.after_flush = Some(Rc::new(hook));
        self
    }

    pub fn change_policy(mut self, policy: ChangePolicy) -> Self {
        self.change_policy = Some(policy);
        self
    }

    pub fn label(mut self, label: impl Into<Rc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn flags(&self) -> WatcherFlags {
        let mut flags = WatcherFlags::empty();
        flags.set(WatcherFlags::LAZY, self.lazy);
        flags.set(WatcherFlags::SYNC, self.sync);
        flags.set(WatcherFlags::USER, self.user);
        flags.set(WatcherFlags::DEEP, self.deep);
        flags.set(WatcherFlags::RENDER, self.render);
        flags
    }
}

// =============================================================================
// Watcher
// =============================================================================

struct WatcherState {
    value: Value,
    deps: BTreeSet<DepId>,
    new_deps: BTreeSet<DepId>,
    dirty: bool,
    active: bool,
}

struct WatcherInner {
    id: WatcherId,
    runtime: Weak<RuntimeInner>,
    flags: WatcherFlags,
    policy: ChangePolicy,
    label: Rc<str>,
    getter: Getter,
    callback: Option<WatchCallback>,
    before: Option<HookFn>,
    after_flush: Option<HookFn>,
    state: RefCell<WatcherState>,
}

/// Handle to a watcher. Clones share the same node.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher and, unless lazy, evaluate it once.
    ///
    /// An evaluation error of a non-user watcher tears it down and is
    /// returned.
    pub fn new(
        runtime: &Runtime,
        getter: Getter,
        callback: Option<WatchCallback>,
        options: WatchOptions,
    ) -> Result<Watcher> {
        let watcher = Self::create(runtime, getter, callback, options);
        if !watcher.is_lazy() {
            match watcher.get() {
                Ok(value) => watcher.inner.state.borrow_mut().value = value,
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    /// Register without evaluating.
    pub(crate) fn create(
        runtime: &Runtime,
        getter: Getter,
        callback: Option<WatchCallback>,
        options: WatchOptions,
    ) -> Watcher {
        let id = runtime.next_watcher_id();
        let flags = options.flags();
        let policy = options
            .change_policy
            .clone()
            .unwrap_or_else(|| runtime.config().change_policy);
        let label = options
            .label
            .clone()
            .unwrap_or_else(|| format!("watcher#{}", id.0).into());

        let watcher = Watcher {
            inner: Rc::new(WatcherInner {
                id,
                runtime: runtime.downgrade(),
                flags,
                policy,
                label,
                getter,
                callback,
                before: options.before,
                after_flush: options.after_flush,
                state: RefCell::new(WatcherState {
                    value: Value::Null,
                    deps: BTreeSet::new(),
                    new_deps: BTreeSet::new(),
                    dirty: options.lazy,
                    active: true,
                }),
            }),
        };
        runtime.register_watcher(watcher.clone());
        watcher
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn flags(&self) -> WatcherFlags {
        self.inner.flags
    }

    pub fn label(&self) -> Rc<str> {
        self.inner.label.clone()
    }

    pub fn is_lazy(&self) -> bool {
        self.inner.flags.contains(WatcherFlags::LAZY)
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().active
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.borrow().dirty
    }

    /// Value from the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.state.borrow().value.clone()
    }

    /// Deps subscribed after the last evaluation, ascending.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.state.borrow().deps.iter().copied().collect()
    }

    fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.inner.runtime)
    }

    /// Evaluate the getter, re-collecting dependencies.
    pub fn get(&self) -> Result<Value> {
        let Some(runtime) = self.runtime() else {
            return Ok(Value::Null);
        };

        runtime.push_target(Some(self.id()));
        let result = match (self.inner.getter)() {
            Ok(value) => {
                if self.inner.flags.contains(WatcherFlags::DEEP) {
                    traverse(&value);
                }
                Ok(value)
            }
            Err(source) => {
                let err = Error::Evaluation {
                    expression: self.label(),
                    source,
                };
                if self.inner.flags.contains(WatcherFlags::USER) {
                    runtime.report_error(&err);
                    Ok(Value::Null)
                } else {
                    Err(err)
                }
            }
        };
        runtime.pop_target();
        self.cleanup_deps(&runtime);
        result
    }

    /// Called by the runtime when the getter reads `dep`.
    pub(crate) fn add_dep(&self, runtime: &Runtime, dep: DepId) {
        let subscribe = {
            let mut state = self.inner.state.borrow_mut();
            state.new_deps.insert(dep) && !state.deps.contains(&dep)
        };
        if subscribe {
            runtime.add_sub(dep, self.id());
        }
    }

    /// Drop subscriptions that were not renewed, then rotate new into old.
    fn cleanup_deps(&self, runtime: &Runtime) {
        let stale: Vec<DepId> = {
            let mut state = self.inner.state.borrow_mut();
            let stale = state.deps.difference(&state.new_deps).copied().collect();
            let fresh = std::mem::take(&mut state.new_deps);
            state.deps = fresh;
            stale
        };
        for dep in stale {
            runtime.remove_sub(dep, self.id());
        }
    }

    /// Invalidate: mark dirty, run now, or queue, depending on mode.
    pub fn update(&self) {
        if self.is_lazy() {
            self.inner.state.borrow_mut().dirty = true;
        } else if self.inner.flags.contains(WatcherFlags::SYNC) {
            if let Err(err) = self.run() {
                if let Some(runtime) = self.runtime() {
                    runtime.report_error(&err);
                }
            }
        } else if let Some(runtime) = self.runtime() {
            runtime.scheduler().queue_watcher(&runtime, self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the policy sees a change.
    pub fn run(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;
        let deep = self.inner.flags.contains(WatcherFlags::DEEP);

        let old = {
            let mut state = self.inner.state.borrow_mut();
            if !self.inner.policy.changed(&state.value, &value, deep) {
                return Ok(());
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.inner.callback {
            if let Err(source) = callback(&value, &old) {
                if let Some(runtime) = self.runtime() {
                    runtime.report_error(&Error::Callback {
                        expression: self.label(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Lazy path: evaluate and clear the dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        let value = self.get()?;
        let mut state = self.inner.state.borrow_mut();
        state.value = value;
        state.dirty = false;
        Ok(())
    }

    /// Make the currently evaluating watcher depend on everything this one
    /// depends on.
    pub fn depend(&self) {
        let Some(runtime) = self.runtime() else { return };
        for dep in self.dep_ids() {
            runtime.depend(dep);
        }
    }

    pub(crate) fn before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    pub(crate) fn after_flush(&self) {
        if let Some(after) = &self.inner.after_flush {
            after();
        }
    }

    /// Unsubscribe from every dep and deactivate. Idempotent.
    pub fn teardown(&self) {
        let deps: Vec<DepId> = {
            let mut state = self.inner.state.borrow_mut();
            if !state.active {
                return;
            }
            state.active = false;
            let deps = std::mem::take(&mut state.deps);
            deps.into_iter().collect()
        };
        if let Some(runtime) = self.runtime() {
            for dep in deps {
                runtime.remove_sub(dep, self.id());
            }
            runtime.unregister_watcher(self.id());
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("flags", &self.inner.flags)
            .field("deps", &state.deps.len())
            .field("dirty", &state.dirty)
            .field("active", &state.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::reactive::Object;
    use std::cell::Cell;

    fn tracked(rt: &Runtime, getter: impl Fn() -> anyhow::Result<Value> + 'static) -> Watcher {
        Watcher::new(rt, Rc::new(getter), None, WatchOptions::new()).unwrap()
    }

    #[test]
    fn test_subscriptions_match_reads() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("flag", true);
        state.set("a", 1);
        state.set("b", 2);

        let s = state.clone();
        let watcher = tracked(&rt, move || {
            Ok(if s.get("flag").is_truthy() { s.get("a") } else { s.get("b") })
        });

        let flag = state.dep_of("flag").unwrap();
        let a = state.dep_of("a").unwrap();
        let b = state.dep_of("b").unwrap();
        assert_eq!(watcher.dep_ids(), vec![flag, a]);

        state.set("flag", false);
        rt.tick();
        assert_eq!(watcher.dep_ids(), vec![flag, b]);
        assert!(rt.subscribers(a).is_empty(), "stale branch unsubscribed");
        assert_eq!(rt.subscribers(b), vec![watcher.id()]);
    }

    #[test]
    fn test_evaluation_error_propagates_for_non_user() {
        let rt = Runtime::new();
        let result = Watcher::new(
            &rt,
            Rc::new(|| Err(anyhow::anyhow!("bad getter"))),
            None,
            WatchOptions::new().label("broken"),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Evaluation { .. }));
        assert_eq!(rt.watcher_count(), 0);
    }

    #[test]
    fn test_evaluation_error_reported_for_user() {
        let reported = Rc::new(Cell::new(0));
        let count = reported.clone();
        let rt = Runtime::with_config(Config::default().error_handler(move |_| count.set(count.get() + 1)));
        let watcher = rt
            .watch(|| Err(anyhow::anyhow!("bad getter")), |_, _| Ok(()), WatchOptions::new())
            .unwrap();
        assert!(watcher.is_active());
        assert_eq!(reported.get(), 1);
    }

    #[test]
    fn test_lazy_marks_dirty_without_running() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("x", 1);

        let evaluations = Rc::new(Cell::new(0));
        let evals = evaluations.clone();
        let s = state.clone();
        let watcher = Watcher::new(
            &rt,
            Rc::new(move || {
                evals.set(evals.get() + 1);
                Ok(s.get("x"))
            }),
            None,
            WatchOptions::new().lazy(),
        )
        .unwrap();

        assert_eq!(evaluations.get(), 0);
        assert!(watcher.is_dirty());
        watcher.evaluate().unwrap();
        assert_eq!(evaluations.get(), 1);
        assert!(!watcher.is_dirty());

        state.set("x", 2);
        assert!(watcher.is_dirty());
        assert_eq!(evaluations.get(), 1);
        assert!(!rt.scheduler().is_waiting(), "lazy watchers are never queued");
    }

    #[test]
    fn test_sync_runs_on_write() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("x", 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_cb = seen.clone();
        let s = state.clone();
        let _w = rt
            .watch(
                move || Ok(s.get("x")),
                move |new, old| {
                    seen_cb.borrow_mut().push((old.clone(), new.clone()));
                    Ok(())
                },
                WatchOptions::new().sync(),
            )
            .unwrap();

        state.set("x", 2);
        assert_eq!(*seen.borrow(), vec![(Value::from(1), Value::from(2))]);
    }

    #[test]
    fn test_deep_watcher_sees_nested_writes() {
        let rt = Runtime::new();
        let state = rt.object();
        let nested = Object::new();
        nested.set("leaf", 1);
        state.set("nested", nested);

        let hits = Rc::new(Cell::new(0));
        let hits_cb = hits.clone();
        let s = state.clone();
        let _w = rt
            .watch(
                move || Ok(s.get("nested")),
                move |_, _| {
                    hits_cb.set(hits_cb.get() + 1);
                    Ok(())
                },
                WatchOptions::new().deep(),
            )
            .unwrap();

        let nested = state.get("nested");
        nested.as_object().unwrap().set("leaf", 2);
        rt.tick();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_identity_policy_skips_in_place_mutation() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("list", Value::from(vec![Value::from(1)]));

        let hits = Rc::new(Cell::new(0));
        let hits_cb = hits.clone();
        let s = state.clone();
        let _w = rt
            .watch(
                move || {
                    let list = s.get("list");
                    if let Some(arr) = list.as_array() {
                        arr.len();
                    }
                    Ok(list)
                },
                move |_, _| {
                    hits_cb.set(hits_cb.get() + 1);
                    Ok(())
                },
                WatchOptions::new().change_policy(ChangePolicy::Identity),
            )
            .unwrap();

        state.get("list").as_array().unwrap().push(2);
        rt.tick();
        assert_eq!(hits.get(), 0, "same array identity, no callback");
    }

    #[test]
    fn test_default_policy_fires_for_containers() {
        assert!(ChangePolicy::Default.changed(
            &Value::from(Object::new()),
            &Value::from(Object::new()),
            false
        ));
        let obj = Value::from(Object::new());
        assert!(ChangePolicy::Default.changed(&obj, &obj, false));
        assert!(!ChangePolicy::Default.changed(&Value::from(1), &Value::from(1), false));
        assert!(ChangePolicy::Default.changed(&Value::from(1), &Value::from(1), true));
        assert!(!ChangePolicy::Default.changed(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN),
            false
        ));
    }

    #[test]
    fn test_teardown_unsubscribes_everything() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("x", 1);
        let s = state.clone();
        let watcher = tracked(&rt, move || Ok(s.get("x")));
        let dep = state.dep_of("x").unwrap();
        assert_eq!(rt.subscribers(dep), vec![watcher.id()]);

        watcher.teardown();
        assert!(rt.subscribers(dep).is_empty());
        assert!(!watcher.is_active());
        assert_eq!(rt.watcher_count(), 0);
    }
}
