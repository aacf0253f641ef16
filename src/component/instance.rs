//! Instance - a live component bound to a placeholder node.
//!
//! An instance owns one render watcher whose evaluation calls the render
//! function and reconciles the result against the previous tree. Mounting is
//! the first evaluation (a patch against no prior tree); every later re-run
//! is a regular patch.
//!
//! ```text
//! create_child
//!   ├─ beforeCreate
//!   ├─ props → data → computed → watch
//!   ├─ created
//!   ├─ beforeMount
//!   └─ render watcher (render + patch, children created recursively)
//!
//! inserted → mounted (children before parents)
//! re-render: beforeUpdate → render + patch → updated (children before parents)
//! destroy:   beforeDestroy → watchers torn down → subtree torn down → destroyed
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::def::{ComponentDef, Hook, LifecycleState, Listener, PropDef, WatchDef, WatchSource};
use super::keep_alive::KeepAlive;
use crate::error::{Error, Result, Warning};
use crate::host::HostNode;
use crate::reactive::{Computed, Object, Runtime, Task, Value, WatchOptions, Watcher};
use crate::vdom::{run_insert_queue, ComponentVNode, Renderer, VNode};

thread_local! {
    static NEXT_INSTANCE: Cell<u64> = const { Cell::new(1) };
}

fn next_instance_uid() -> u64 {
    NEXT_INSTANCE.with(|uid| {
        let id = uid.get();
        uid.set(id + 1);
        id
    })
}

// =============================================================================
// Instance State
// =============================================================================

pub(crate) struct InstanceInner {
    uid: u64,
    def: Rc<ComponentDef>,
    renderer: Renderer,
    runtime: Runtime,

    props: Object,
    /// Props as last passed by the parent.
    raw_props: RefCell<BTreeMap<Rc<str>, Value>>,
    data: RefCell<Object>,
    computed: RefCell<BTreeMap<Rc<str>, Computed>>,
    watchers: RefCell<Vec<Watcher>>,
    render_watcher: RefCell<Option<Watcher>>,

    /// Realized root of the rendered tree.
    vnode: RefCell<Option<VNode>>,
    el: Cell<Option<HostNode>>,

    parent: Option<Weak<InstanceInner>>,
    children: RefCell<Vec<Instance>>,
    listeners: RefCell<BTreeMap<Rc<str>, Listener>>,
    slot: RefCell<Vec<VNode>>,
    /// Caches holding children this instance rendered. Released on destroy.
    caches: RefCell<Vec<KeepAlive>>,

    state: Cell<LifecycleState>,
    is_mounted: Cell<bool>,
    is_destroyed: Cell<bool>,
    being_destroyed: Cell<bool>,
    /// `None` until first activated.
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,

    /// Insert callbacks of the initial tree, handed to the enclosing patch.
    pending_insert: RefCell<Vec<Task>>,
    /// False for roots mounted directly into a container.
    has_placeholder: bool,
    /// Error from the initial render, surfaced by `create`.
    render_error: RefCell<Option<Error>>,
}

/// Handle to a component instance. Clones share the instance.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

impl Instance {
    // =========================================================================
    // Creation
    // =========================================================================

    /// Instantiate and mount a component for a placeholder node.
    pub(crate) fn create_child(renderer: &Renderer, vnode: &ComponentVNode, parent: Option<Instance>) -> Result<Instance> {
        Self::create(renderer, vnode, parent, true)
    }

    fn create(
        renderer: &Renderer,
        vnode: &ComponentVNode,
        parent: Option<Instance>,
        has_placeholder: bool,
    ) -> Result<Instance> {
        let runtime = renderer.runtime().clone();
        let instance = Instance {
            inner: Rc::new(InstanceInner {
                uid: next_instance_uid(),
                def: vnode.def.clone(),
                renderer: renderer.clone(),
                props: runtime.object(),
                raw_props: RefCell::new(BTreeMap::new()),
                data: RefCell::new(runtime.object()),
                computed: RefCell::new(BTreeMap::new()),
                watchers: RefCell::new(Vec::new()),
                render_watcher: RefCell::new(None),
                vnode: RefCell::new(None),
                el: Cell::new(None),
                parent: parent.as_ref().map(|p| Rc::downgrade(&p.inner)),
                children: RefCell::new(Vec::new()),
                listeners: RefCell::new(vnode.listeners.clone()),
                slot: RefCell::new(vnode.slot.clone()),
                caches: RefCell::new(Vec::new()),
                state: Cell::new(LifecycleState::Uninitialized),
                is_mounted: Cell::new(false),
                is_destroyed: Cell::new(false),
                being_destroyed: Cell::new(false),
                inactive: Cell::new(None),
                direct_inactive: Cell::new(false),
                pending_insert: RefCell::new(Vec::new()),
                has_placeholder,
                render_error: RefCell::new(None),
                runtime,
            }),
        };
        if let Some(parent) = &parent {
            parent.inner.children.borrow_mut().push(instance.clone());
        }
        tracing::debug!(component = %instance.name(), uid = instance.uid(), "creating component");

        let result = instance.init(vnode).and_then(|()| instance.mount());
        match result {
            Ok(()) => Ok(instance),
            Err(err) => {
                instance.destroy();
                Err(err)
            }
        }
    }

    fn init(&self, vnode: &ComponentVNode) -> Result<()> {
        self.call_hook(Hook::BeforeCreate);
        self.init_props(&vnode.props);
        self.init_data();
        self.init_computed();
        for watch in self.inner.def.watch.clone() {
            self.watch(watch)?;
        }
        self.call_hook(Hook::Created);
        Ok(())
    }

    fn init_props(&self, passed: &BTreeMap<Rc<str>, Value>) {
        let runtime = &self.inner.runtime;
        runtime.untracked(|| {
            for prop in &self.inner.def.props {
                let value = self.resolve_prop(prop, passed.get(&prop.name).cloned(), None);
                if passed.contains_key(&prop.name) {
                    // The parent already observes what it passes.
                    runtime.without_observing(|| self.inner.props.set(&prop.name, value));
                } else {
                    self.inner.props.set(&prop.name, value);
                }
            }
        });
        *self.inner.raw_props.borrow_mut() = passed.clone();
    }

    /// Value for one declared prop, warning on missing or invalid input.
    /// An absent prop that was already absent keeps its current default.
    fn resolve_prop(&self, prop: &PropDef, passed: Option<Value>, previous: Option<Value>) -> Value {
        match passed {
            Some(value) => {
                if !prop.is_valid(&value) {
                    self.inner.runtime.warn(Warning::InvalidProp {
                        component: self.name(),
                        prop: prop.name.clone(),
                    });
                }
                value
            }
            None => {
                if prop.required {
                    self.inner.runtime.warn(Warning::MissingRequiredProp {
                        component: self.name(),
                        prop: prop.name.clone(),
                    });
                }
                previous.unwrap_or_else(|| prop.default_value())
            }
        }
    }

    fn init_data(&self) {
        let Some(init) = self.inner.def.data.clone() else {
            return;
        };
        let runtime = self.inner.runtime.clone();
        let data = runtime.untracked(|| init(self));
        runtime.observe(&Value::Object(data.clone()));
        *self.inner.data.borrow_mut() = data;
    }

    fn init_computed(&self) {
        let runtime = self.inner.runtime.clone();
        for (key, getter) in &self.inner.def.computed {
            let weak = Rc::downgrade(&self.inner);
            let getter = getter.clone();
            let label: Rc<str> = format!("{}.{key}", self.name()).into();
            let tracked = move || -> anyhow::Result<Value> {
                match Instance::upgrade(&weak) {
                    Some(vm) => getter(&vm),
                    None => Ok(Value::Null),
                }
            };
            let computed = Computed::new(&runtime, Rc::new(tracked), Some(label));
            self.inner.computed.borrow_mut().insert(key.clone(), computed);
        }
    }

    fn mount(&self) -> Result<()> {
        self.call_hook(Hook::BeforeMount);

        let render = Rc::downgrade(&self.inner);
        let before = Rc::downgrade(&self.inner);
        let after = Rc::downgrade(&self.inner);
        let options = WatchOptions {
            render: true,
            before: Some(Rc::new(move || {
                if let Some(vm) = Instance::upgrade(&before) {
                    if vm.is_mounted() && !vm.is_destroyed() {
                        vm.call_hook(Hook::BeforeUpdate);
                    }
                }
            })),
            after_flush: Some(Rc::new(move || {
                if let Some(vm) = Instance::upgrade(&after) {
                    if vm.is_mounted() && !vm.is_destroyed() {
                        vm.inner.state.set(LifecycleState::Updated);
                        vm.call_hook(Hook::Updated);
                    }
                }
            })),
            label: Some(format!("render <{}>", self.name()).into()),
            ..WatchOptions::default()
        };
        let getter = move || -> anyhow::Result<Value> {
            if let Some(vm) = Instance::upgrade(&render) {
                vm.run_render();
            }
            Ok(Value::Null)
        };
        let watcher = Watcher::new(&self.inner.runtime, Rc::new(getter), None, options)?;
        *self.inner.render_watcher.borrow_mut() = Some(watcher);

        let failed = self.inner.render_error.borrow_mut().take();
        match failed {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Render
    // =========================================================================

    /// Render watcher body. The first render's error is kept for `create`;
    /// later errors are reported.
    fn run_render(&self) {
        let initial = self.inner.vnode.borrow().is_none();
        if let Err(err) = self.render_and_patch() {
            if initial {
                *self.inner.render_error.borrow_mut() = Some(err);
            } else {
                self.inner.runtime.report_error(&err);
            }
        }
    }

    fn render_and_patch(&self) -> Result<()> {
        let inner = &self.inner;
        let rendered = match &inner.def.render {
            Some(render) => render(self),
            None => Ok(VNode::comment("")),
        };
        let mut vnode = match rendered {
            Ok(vnode) => vnode,
            Err(source) => {
                let err = Error::Render {
                    component: self.name(),
                    source,
                };
                if !self.capture_error(&err) {
                    if inner.runtime.config().error_handler.is_none() {
                        return Err(err);
                    }
                    inner.runtime.report_error(&err);
                }
                // Keep the stale tree.
                if inner.vnode.borrow().is_some() {
                    return Ok(());
                }
                VNode::comment("")
            }
        };

        let renderer = inner.renderer.clone();
        let previous = inner.vnode.borrow_mut().take();
        renderer.push_active(self.clone());
        let result = inner.runtime.untracked(|| {
            let mut queue = Vec::new();
            match previous {
                None => {
                    let result = renderer.create_tree(&mut vnode, &mut queue);
                    inner.pending_insert.borrow_mut().extend(queue);
                    result
                }
                Some(old) => {
                    let result = renderer.patch_tree(old, &mut vnode, &mut queue);
                    run_insert_queue(queue);
                    result
                }
            }
        });
        renderer.pop_active();

        inner.el.set(vnode.elm());
        *inner.vnode.borrow_mut() = Some(vnode);
        result
    }

    pub(crate) fn take_pending_insert(&self) -> Vec<Task> {
        std::mem::take(&mut *self.inner.pending_insert.borrow_mut())
    }

    /// Called once the instance's root is attached.
    pub(crate) fn on_inserted(&self, keep_alive: bool) {
        let inner = &self.inner;
        if !inner.is_mounted.get() {
            inner.is_mounted.set(true);
            inner.state.set(LifecycleState::Mounted);
            self.call_hook(Hook::Mounted);
        }
        if !keep_alive {
            return;
        }
        let parent_mounted = self.parent().is_some_and(|parent| parent.is_mounted());
        if parent_mounted && inner.runtime.is_flushing() {
            // Resume after the flush so the whole updated tree is in place.
            let instance = self.clone();
            inner
                .runtime
                .scheduler()
                .queue_activated(Box::new(move || instance.activate(true)));
        } else {
            self.activate(true);
        }
    }

    /// Apply new inputs from the parent's re-render.
    pub(crate) fn update_from_vnode(&self, vnode: &ComponentVNode) {
        let inner = &self.inner;
        let had_slot = !inner.slot.borrow().is_empty();
        *inner.slot.borrow_mut() = vnode.slot.clone();
        *inner.listeners.borrow_mut() = vnode.listeners.clone();

        let previous = inner.raw_props.replace(vnode.props.clone());
        inner.runtime.untracked(|| {
            inner.runtime.without_observing(|| {
                for prop in &inner.def.props {
                    let kept = (!previous.contains_key(&prop.name)).then(|| inner.props.get(&prop.name));
                    let value = self.resolve_prop(prop, vnode.props.get(&prop.name).cloned(), kept);
                    inner.props.set(&prop.name, value);
                }
            });
        });

        // Slot content is not reactive; re-render whenever there is any.
        if had_slot || !vnode.slot.is_empty() {
            self.force_update();
        }
    }

    // =========================================================================
    // Keep-alive
    // =========================================================================

    fn in_inactive_tree(&self) -> bool {
        let mut current = self.parent();
        while let Some(vm) = current {
            if vm.inner.inactive.get() == Some(true) {
                return true;
            }
            current = vm.parent();
        }
        false
    }

    /// Resume a cached instance and its subtree, children first.
    pub(crate) fn activate(&self, direct: bool) {
        let inner = &self.inner;
        if inner.is_destroyed.get() {
            return;
        }
        if direct {
            inner.direct_inactive.set(false);
            if self.in_inactive_tree() {
                return;
            }
        } else if inner.direct_inactive.get() {
            return;
        }
        if inner.inactive.get() != Some(false) {
            inner.inactive.set(Some(false));
            for child in self.children() {
                child.activate(false);
            }
            self.call_hook(Hook::Activated);
        }
    }

    /// Suspend instead of destroying, children first.
    pub(crate) fn deactivate(&self, direct: bool) {
        let inner = &self.inner;
        if inner.is_destroyed.get() {
            return;
        }
        if direct {
            inner.direct_inactive.set(true);
            if self.in_inactive_tree() {
                return;
            }
        }
        if inner.inactive.get() != Some(true) {
            inner.inactive.set(Some(true));
            for child in self.children() {
                child.deactivate(false);
            }
            self.call_hook(Hook::Deactivated);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Tear the instance down: watchers unsubscribed, subtree destroyed
    /// children first. Idempotent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.being_destroyed.get() {
            return;
        }
        self.call_hook(Hook::BeforeDestroy);
        inner.being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.inner.being_destroyed.get() {
                parent.inner.children.borrow_mut().retain(|child| !child.ptr_eq(self));
            }
        }

        let render_watcher = inner.render_watcher.borrow_mut().take();
        if let Some(watcher) = render_watcher {
            watcher.teardown();
        }
        let watchers = std::mem::take(&mut *inner.watchers.borrow_mut());
        for watcher in watchers {
            watcher.teardown();
        }
        let computed = std::mem::take(&mut *inner.computed.borrow_mut());
        for computed in computed.values() {
            computed.dispose();
        }
        inner.is_destroyed.set(true);

        let vnode = inner.vnode.borrow_mut().take();
        if let Some(vnode) = &vnode {
            inner.renderer.teardown_tree(vnode);
        }
        let caches = std::mem::take(&mut *inner.caches.borrow_mut());
        for cache in caches {
            cache.release(self);
        }
        self.call_hook(Hook::Destroyed);

        if !inner.has_placeholder {
            if let Some(el) = inner.el.get() {
                let host = inner.renderer.host();
                if let Some(parent) = host.parent_of(el) {
                    host.remove(parent, el);
                }
            }
        }
        inner.children.borrow_mut().clear();
        inner.state.set(LifecycleState::Unmounted);
        tracing::debug!(component = %self.name(), uid = self.uid(), "destroyed component");
    }

    /// Tie `cache` to this instance's lifetime.
    pub(crate) fn adopt_cache(&self, cache: &KeepAlive) {
        let mut caches = self.inner.caches.borrow_mut();
        if !caches.iter().any(|known| known.ptr_eq(cache)) {
            caches.push(cache.clone());
        }
    }

    pub(crate) fn with_root_vnode(&self, f: impl FnOnce(&VNode)) {
        if let Some(vnode) = self.inner.vnode.borrow().as_ref() {
            f(vnode);
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Offer `err` to the `error_captured` hooks of each ancestor. Returns
    /// true once a hook stops propagation.
    pub fn capture_error(&self, err: &Error) -> bool {
        let mut current = self.parent();
        while let Some(vm) = current {
            for hook in &vm.inner.def.error_captured {
                if !hook(err, self) {
                    return true;
                }
            }
            current = vm.parent();
        }
        false
    }

    /// Route an error through the ancestors, then to the runtime handler.
    pub fn report(&self, err: Error) {
        if !self.capture_error(&err) {
            self.inner.runtime.report_error(&err);
        }
    }

    pub(crate) fn call_hook(&self, hook: Hook) {
        let def = self.inner.def.clone();
        for f in def.hooks_for(hook) {
            if let Err(source) = self.inner.runtime.untracked(|| f(self)) {
                self.report(Error::Hook {
                    hook,
                    component: self.name(),
                    source,
                });
            }
        }
    }

    // =========================================================================
    // Public API
    // =========================================================================

    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn name(&self) -> Rc<str> {
        self.inner.def.name()
    }

    pub fn def(&self) -> &Rc<ComponentDef> {
        &self.inner.def
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a prop, data field or computed value, in that order.
    pub fn get(&self, key: &str) -> Value {
        let inner = &self.inner;
        if inner.def.prop_def(key).is_some() {
            return inner.props.get(key);
        }
        let data = inner.data.borrow().clone();
        if data.raw_keys().iter().any(|k| &**k == key) {
            return data.get(key);
        }
        let computed = inner.computed.borrow().get(key).cloned();
        if let Some(computed) = computed {
            return match computed.get() {
                Ok(value) => value,
                Err(err) => {
                    self.report(err);
                    Value::Null
                }
            };
        }
        inner.runtime.warn(Warning::UnknownProperty {
            component: self.name(),
            key: key.into(),
        });
        Value::Null
    }

    /// Write a data field, defining it when absent. Writing a prop warns;
    /// the parent's next render overwrites it.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let inner = &self.inner;
        if inner.def.prop_def(key).is_some() {
            inner.runtime.warn(Warning::MutatedProp {
                component: self.name(),
                prop: key.into(),
            });
            inner.props.set(key, value);
            return;
        }
        let data = inner.data.borrow().clone();
        data.set(key, value);
    }

    pub fn prop(&self, name: &str) -> Value {
        self.inner.props.get(name)
    }

    pub fn props(&self) -> Object {
        self.inner.props.clone()
    }

    pub fn data(&self) -> Object {
        self.inner.data.borrow().clone()
    }

    pub fn computed(&self, key: &str) -> Option<Computed> {
        self.inner.computed.borrow().get(key).cloned()
    }

    /// Watch a path or getter for the lifetime of the instance.
    pub fn watch(&self, watch: WatchDef) -> Result<Watcher> {
        let runtime = self.inner.runtime.clone();
        let label = format!("{}.{}", self.name(), watch.label());

        let weak = Rc::downgrade(&self.inner);
        let source = watch.source.clone();
        let getter = move || -> anyhow::Result<Value> {
            let Some(vm) = Instance::upgrade(&weak) else {
                return Ok(Value::Null);
            };
            match &source {
                WatchSource::Path(path) => Ok(vm.get_path(path)),
                WatchSource::Getter(getter) => getter(&vm),
            }
        };

        let weak = Rc::downgrade(&self.inner);
        let handler = watch.handler.clone();
        let expression: Rc<str> = label.clone().into();
        let callback = move |new: &Value, old: &Value| -> anyhow::Result<()> {
            let Some(vm) = Instance::upgrade(&weak) else {
                return Ok(());
            };
            if let Err(source) = handler(&vm, new, old) {
                vm.report(Error::Callback {
                    expression: expression.clone(),
                    source,
                });
            }
            Ok(())
        };

        let mut options = WatchOptions::new().label(label);
        options.deep = watch.deep;
        options.immediate = watch.immediate;
        options.sync = watch.sync;

        let watcher = runtime.watch(getter, callback, options)?;
        self.inner.watchers.borrow_mut().push(watcher.clone());
        Ok(watcher)
    }

    /// Resolve a dotted path such as `user.tags.0`.
    fn get_path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        segments.fold(self.get(first), |value, segment| match &value {
            Value::Object(object) => object.get(segment),
            Value::Array(array) => segment.parse().map_or(Value::Null, |index| array.get(index)),
            _ => Value::Null,
        })
    }

    /// Schedule a re-render.
    pub fn force_update(&self) {
        let watcher = self.inner.render_watcher.borrow().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    pub fn next_tick(&self, callback: impl FnOnce() + 'static) {
        self.inner.runtime.next_tick(callback);
    }

    /// Invoke the listener the parent registered for `event`. Returns
    /// whether a listener was found.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        let listener = self.inner.listeners.borrow().get(event).cloned();
        let Some(listener) = listener else {
            return false;
        };
        if let Err(source) = listener(args) {
            self.report(Error::Listener {
                event: event.into(),
                component: self.name(),
                source,
            });
        }
        true
    }

    /// Default slot content passed by the parent.
    pub fn slot(&self) -> Vec<VNode> {
        self.inner.slot.borrow().clone()
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner.parent.as_ref().and_then(Instance::upgrade)
    }

    pub fn children(&self) -> Vec<Instance> {
        self.inner.children.borrow().clone()
    }

    /// Root of the last rendered tree.
    pub fn root_node(&self) -> Option<VNode> {
        self.inner.vnode.borrow().clone()
    }

    /// Host node of the rendered root.
    pub fn el(&self) -> Option<HostNode> {
        self.inner.el.get()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.render_watcher.borrow().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed.get()
    }

    pub fn is_inactive(&self) -> bool {
        self.inner.inactive.get() == Some(true)
    }

    pub(crate) fn downgrade(&self) -> Weak<InstanceInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<InstanceInner>) -> Option<Instance> {
        weak.upgrade().map(|inner| Instance { inner })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("uid", &self.inner.uid)
            .field("name", &self.inner.def.name())
            .field("state", &self.inner.state.get())
            .field("children", &self.inner.children.borrow().len())
            .field("el", &self.inner.el.get())
            .finish()
    }
}

// =============================================================================
// Root Mounting
// =============================================================================

impl Renderer {
    /// Instantiate `def` as a root component and append it to `container`.
    /// `mounted` hooks fire children first once the tree is attached.
    pub fn mount_component(&self, def: &Rc<ComponentDef>, props: &[(&str, Value)], container: HostNode) -> Result<Instance> {
        let mut vnode = ComponentVNode::new(def.clone());
        for (name, value) in props {
            vnode.props.insert((*name).into(), value.clone());
        }
        let instance = Instance::create(self, &vnode, None, false)?;
        if let Some(el) = instance.el() {
            self.host().append(container, el);
        }
        run_insert_queue(instance.take_pending_insert());
        instance.on_inserted(false);
        tracing::debug!(component = %def.name(), "mounted root component");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::PropDef;
    use crate::config::Config;
    use crate::host::MemoryHost;
    use crate::vdom::h;

    type Log = Rc<RefCell<Vec<String>>>;

    fn setup() -> (Runtime, Rc<MemoryHost>, Renderer, HostNode) {
        let runtime = Runtime::new();
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&runtime, host.clone());
        let root = host.container();
        (runtime, host, renderer, root)
    }

    fn logged(def: ComponentDef, log: &Log, hooks: &[Hook]) -> ComponentDef {
        let name = def.name();
        hooks.iter().fold(def, |def, &hook| {
            let log = log.clone();
            let name = name.clone();
            def.hook(hook, move |_| {
                log.borrow_mut().push(format!("{name}:{hook}"));
                Ok(())
            })
        })
    }

    fn counter() -> Rc<ComponentDef> {
        ComponentDef::new("Counter")
            .prop(PropDef::new("start").default(0))
            .data(|vm| Object::from_iter([("count", vm.prop("start"))]))
            .computed("double", |vm| Ok(Value::from(vm.get("count").as_f64().unwrap_or(0.0) * 2.0)))
            .render(|vm| Ok(h("span").text_content(format!("{}/{}", vm.get("count"), vm.get("double")))))
            .build()
    }

    #[test]
    fn test_mount_renders_from_props_data_and_computed() {
        let (_rt, host, renderer, root) = setup();
        let vm = renderer
            .mount_component(&counter(), &[("start", Value::from(2))], root)
            .unwrap();

        assert_eq!(host.serialize(root), "<span>2/4</span>");
        assert_eq!(vm.state(), LifecycleState::Mounted);
        assert!(vm.is_mounted());
    }

    #[test]
    fn test_data_write_rerenders_on_tick() {
        let (rt, host, renderer, root) = setup();
        let vm = renderer.mount_component(&counter(), &[], root).unwrap();

        vm.set("count", 5);
        vm.set("count", 6);
        assert_eq!(host.serialize(root), "<span>0/0</span>", "re-render waits for the flush");
        rt.tick();
        assert_eq!(host.serialize(root), "<span>6/12</span>");
        assert_eq!(vm.state(), LifecycleState::Updated);
    }

    #[test]
    fn test_lifecycle_order_nested() {
        let (rt, _host, renderer, root) = setup();
        let log: Log = Rc::default();
        let all = [Hook::Created, Hook::BeforeMount, Hook::Mounted, Hook::BeforeUpdate, Hook::Updated];

        let child = logged(ComponentDef::new("Child"), &log, &all)
            .prop(PropDef::new("n"))
            .render(|vm| Ok(h("i").text_content(vm.prop("n").to_string())))
            .build();
        let parent = logged(ComponentDef::new("Parent"), &log, &all)
            .data(|_| Object::from_iter([("n", 1)]))
            .render(move |vm| Ok(h("div").child(VNode::component(&child).prop("n", vm.get("n")))))
            .build();

        let vm = renderer.mount_component(&parent, &[], root).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "Parent:created",
                "Parent:beforeMount",
                "Child:created",
                "Child:beforeMount",
                "Child:mounted",
                "Parent:mounted",
            ]
        );

        log.borrow_mut().clear();
        vm.set("n", 2);
        rt.tick();
        assert_eq!(
            *log.borrow(),
            vec![
                "Parent:beforeUpdate",
                "Child:beforeUpdate",
                "Child:updated",
                "Parent:updated",
            ]
        );
    }

    #[test]
    fn test_prop_update_rerenders_child_in_place() {
        let (rt, host, renderer, root) = setup();
        let child = ComponentDef::new("Label")
            .prop(PropDef::new("text").required())
            .render(|vm| Ok(h("b").text_content(vm.prop("text").to_string())))
            .build();
        let parent = ComponentDef::new("App")
            .data(|_| Object::from_iter([("label", "one")]))
            .render(move |vm| Ok(h("p").child(VNode::component(&child).prop("text", vm.get("label")))))
            .build();

        let vm = renderer.mount_component(&parent, &[], root).unwrap();
        let child_vm = vm.children()[0].clone();
        host.clear_ops();

        vm.set("label", "two");
        rt.tick();
        assert_eq!(host.serialize(root), "<p><b>two</b></p>");
        assert_eq!(host.counts().created, 0);
        assert!(vm.children()[0].ptr_eq(&child_vm));
    }

    #[test]
    fn test_missing_required_prop_warns() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        let rt = Runtime::with_config(Config::default().warn_handler(move |w| sink.borrow_mut().push(w.clone())));
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&rt, host.clone());

        let def = ComponentDef::new("Needy")
            .prop(PropDef::new("id").required())
            .prop(PropDef::new("size").validator(|v| v.as_f64().is_some()))
            .build();
        renderer
            .mount_component(&def, &[("size", Value::from("big"))], host.container())
            .unwrap();

        assert_eq!(
            *warnings.borrow(),
            vec![
                Warning::MissingRequiredProp {
                    component: "Needy".into(),
                    prop: "id".into()
                },
                Warning::InvalidProp {
                    component: "Needy".into(),
                    prop: "size".into()
                },
            ]
        );
    }

    #[test]
    fn test_destroy_tears_down_children_first() {
        let (rt, host, renderer, root) = setup();
        let log: Log = Rc::default();
        let child = logged(ComponentDef::new("Child"), &log, &[Hook::BeforeDestroy, Hook::Destroyed])
            .render(|_| Ok(h("i")))
            .build();
        let parent = logged(ComponentDef::new("Parent"), &log, &[Hook::BeforeDestroy, Hook::Destroyed])
            .render(move |_| Ok(h("div").child(VNode::component(&child))))
            .build();

        let watchers_before = rt.watcher_count();
        let vm = renderer.mount_component(&parent, &[], root).unwrap();
        assert!(rt.watcher_count() > watchers_before);

        vm.destroy();
        assert_eq!(
            *log.borrow(),
            vec!["Parent:beforeDestroy", "Child:beforeDestroy", "Child:destroyed", "Parent:destroyed"]
        );
        assert_eq!(rt.watcher_count(), watchers_before);
        assert!(host.children_of(root).is_empty());
        assert_eq!(vm.state(), LifecycleState::Unmounted);
    }

    #[test]
    fn test_conditional_child_is_destroyed_on_removal() {
        let (rt, host, renderer, root) = setup();
        let destroyed = Rc::new(Cell::new(false));
        let flag = destroyed.clone();
        let child = ComponentDef::new("Child")
            .hook(Hook::Destroyed, move |_| {
                flag.set(true);
                Ok(())
            })
            .render(|_| Ok(h("i")))
            .build();
        let parent = ComponentDef::new("Parent")
            .data(|_| Object::from_iter([("show", true)]))
            .render(move |vm| {
                let node = match vm.get("show").is_truthy() {
                    true => h("div").child(VNode::component(&child)),
                    false => h("div"),
                };
                Ok(node)
            })
            .build();

        let vm = renderer.mount_component(&parent, &[], root).unwrap();
        vm.set("show", false);
        rt.tick();

        assert!(destroyed.get());
        assert!(vm.children().is_empty());
        assert_eq!(host.serialize(root), "<div></div>");
    }

    #[test]
    fn test_emit_calls_parent_listener() {
        let (_rt, _host, renderer, root) = setup();
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = received.clone();
        let child = ComponentDef::new("Button").render(|_| Ok(h("button"))).build();
        let parent = ComponentDef::new("Form")
            .render(move |_| {
                let sink = sink.clone();
                Ok(h("form").child(VNode::component(&child).on("press", move |args| {
                    sink.borrow_mut().extend(args.iter().cloned());
                    Ok(())
                })))
            })
            .build();

        let vm = renderer.mount_component(&parent, &[], root).unwrap();
        let button = vm.children()[0].clone();
        assert!(button.emit("press", &[Value::from(1)]));
        assert!(!button.emit("missing", &[]));
        assert_eq!(*received.borrow(), vec![Value::from(1)]);
    }

    #[test]
    fn test_declared_watch_sees_new_and_old() {
        let (rt, _host, renderer, root) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let def = ComponentDef::new("Form")
            .data(|_| Object::from_iter([("user", Value::from(Object::from_iter([("name", "ann")])))]))
            .watch(WatchDef::path("user.name", move |_, new, old| {
                sink.borrow_mut().push((new.to_string(), old.to_string()));
                Ok(())
            }))
            .build();

        let vm = renderer.mount_component(&def, &[], root).unwrap();
        let user = vm.get("user");
        user.as_object().unwrap().set("name", "bob");
        rt.tick();
        assert_eq!(*seen.borrow(), vec![("bob".to_string(), "ann".to_string())]);
    }

    #[test]
    fn test_hook_error_is_captured_by_ancestor() {
        let (_rt, _host, renderer, root) = setup();
        let captured = Rc::new(RefCell::new(Vec::new()));
        let sink = captured.clone();
        let child = ComponentDef::new("Faulty")
            .hook(Hook::Mounted, |_| Err(anyhow::anyhow!("boom")))
            .render(|_| Ok(h("i")))
            .build();
        let parent = ComponentDef::new("Boundary")
            .error_captured(move |err, vm| {
                sink.borrow_mut().push(format!("{} from {}", err, vm.name()));
                false
            })
            .render(move |_| Ok(h("div").child(VNode::component(&child))))
            .build();

        renderer.mount_component(&parent, &[], root).unwrap();
        assert_eq!(
            *captured.borrow(),
            vec!["error in mounted hook of <Faulty>: boom from Faulty".to_string()]
        );
    }

    #[test]
    fn test_render_error_propagates_to_mount_caller() {
        let (rt, host, renderer, root) = setup();
        let def = ComponentDef::new("Broken")
            .render(|_| Err(anyhow::anyhow!("bad template")))
            .build();

        let err = renderer.mount_component(&def, &[], root).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(host.children_of(root).is_empty());
        assert_eq!(rt.watcher_count(), 0);
    }

    #[test]
    fn test_render_error_with_handler_keeps_stale_tree() {
        let errors = Rc::new(Cell::new(0));
        let count = errors.clone();
        let rt = Runtime::with_config(Config::default().error_handler(move |_| count.set(count.get() + 1)));
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&rt, host.clone());
        let root = host.container();

        let def = ComponentDef::new("Flaky")
            .data(|_| Object::from_iter([("ok", true)]))
            .render(|vm| match vm.get("ok").is_truthy() {
                true => Ok(h("p").text_content("fine")),
                false => Err(anyhow::anyhow!("flaked")),
            })
            .build();

        let vm = renderer.mount_component(&def, &[], root).unwrap();
        vm.set("ok", false);
        rt.tick();
        assert_eq!(errors.get(), 1);
        assert_eq!(host.serialize(root), "<p>fine</p>");
    }

    #[test]
    fn test_unknown_property_warns() {
        let warnings = Rc::new(Cell::new(0));
        let count = warnings.clone();
        let rt = Runtime::with_config(Config::default().warn_handler(move |_| count.set(count.get() + 1)));
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&rt, host.clone());

        let vm = renderer
            .mount_component(&ComponentDef::new("Empty").build(), &[], host.container())
            .unwrap();
        assert_eq!(vm.get("nope"), Value::Null);
        assert_eq!(warnings.get(), 1);
    }

    #[test]
    fn test_slot_content_is_rendered_by_child() {
        let (_rt, host, renderer, root) = setup();
        let card = ComponentDef::new("Card")
            .render(|vm| Ok(h("section").children(vm.slot())))
            .build();
        let app = ComponentDef::new("App")
            .render(move |_| Ok(VNode::component(&card).slot([h("h1").text_content("title")])))
            .build();

        renderer.mount_component(&app, &[], root).unwrap();
        assert_eq!(host.serialize(root), "<section><h1>title</h1></section>");
    }
}
