//! AsyncComponent - a component definition that arrives later.
//!
//! Until the definition is resolved, rendering an async component yields a
//! comment placeholder (or the optional loading component). Every instance
//! that rendered the placeholder is recorded as an owner and re-rendered
//! once the factory settles.
//!
//! ```text
//! Pending ──resolve(def)──► Resolved(def)
//!    │
//!    └────reject(reason)──► Failed(reason)
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::def::ComponentDef;
use super::instance::{Instance, InstanceInner};
use crate::vdom::VNode;

#[derive(Clone)]
enum AsyncState {
    Pending,
    Resolved(Rc<ComponentDef>),
    Failed(Rc<str>),
}

struct AsyncInner {
    state: RefCell<AsyncState>,
    owners: RefCell<Vec<Weak<InstanceInner>>>,
    loading: RefCell<Option<Rc<ComponentDef>>>,
    error: RefCell<Option<Rc<ComponentDef>>>,
}

/// Handle to one async component factory. Clones share the state.
#[derive(Clone)]
pub struct AsyncComponent {
    inner: Rc<AsyncInner>,
}

impl AsyncComponent {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(AsyncInner {
                state: RefCell::new(AsyncState::Pending),
                owners: RefCell::new(Vec::new()),
                loading: RefCell::new(None),
                error: RefCell::new(None),
            }),
        }
    }

    /// Rendered while pending instead of an empty placeholder.
    pub fn loading(self, def: &Rc<ComponentDef>) -> Self {
        *self.inner.loading.borrow_mut() = Some(def.clone());
        self
    }

    /// Rendered after the factory failed.
    pub fn error(self, def: &Rc<ComponentDef>) -> Self {
        *self.inner.error.borrow_mut() = Some(def.clone());
        self
    }

    pub fn ptr_eq(&self, other: &AsyncComponent) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), AsyncState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.inner.state.borrow(), AsyncState::Resolved(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.inner.state.borrow(), AsyncState::Failed(_))
    }

    pub fn resolved_def(&self) -> Option<Rc<ComponentDef>> {
        match &*self.inner.state.borrow() {
            AsyncState::Resolved(def) => Some(def.clone()),
            _ => None,
        }
    }

    /// Node to render for this component from inside `owner`'s render.
    pub fn vnode(&self, owner: &Instance) -> VNode {
        let state = self.inner.state.borrow().clone();
        let def = match state {
            AsyncState::Resolved(def) => Some(def),
            AsyncState::Failed(_) => self.inner.error.borrow().clone(),
            AsyncState::Pending => {
                self.add_owner(owner);
                self.inner.loading.borrow().clone()
            }
        };
        match def {
            Some(def) => {
                let mut node = VNode::component(&def);
                node.async_factory = Some(self.clone());
                node
            }
            None => VNode::async_placeholder(self),
        }
    }

    fn add_owner(&self, owner: &Instance) {
        let mut owners = self.inner.owners.borrow_mut();
        owners.retain(|weak| weak.strong_count() > 0);
        let weak = owner.downgrade();
        if !owners.iter().any(|known| known.ptr_eq(&weak)) {
            owners.push(weak);
        }
    }

    /// Settle with a definition and re-render every owner.
    pub fn resolve(&self, def: Rc<ComponentDef>) {
        if !self.is_pending() {
            return;
        }
        tracing::debug!(component = %def.name(), "async component resolved");
        *self.inner.state.borrow_mut() = AsyncState::Resolved(def);
        self.notify_owners();
    }

    /// Settle as failed and re-render every owner.
    pub fn reject(&self, reason: impl Into<Rc<str>>) {
        if !self.is_pending() {
            return;
        }
        let reason = reason.into();
        tracing::error!(reason = %reason, "failed to resolve async component");
        *self.inner.state.borrow_mut() = AsyncState::Failed(reason);
        self.notify_owners();
    }

    fn notify_owners(&self) {
        let owners = std::mem::take(&mut *self.inner.owners.borrow_mut());
        for owner in owners.iter().filter_map(Instance::upgrade) {
            if !owner.is_destroyed() {
                owner.force_update();
            }
        }
    }
}

impl Default for AsyncComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AsyncComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            AsyncState::Pending => "pending".to_string(),
            AsyncState::Resolved(def) => format!("resolved({})", def.name()),
            AsyncState::Failed(reason) => format!("failed({reason})"),
        };
        f.debug_struct("AsyncComponent")
            .field("state", &state)
            .field("owners", &self.inner.owners.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::reactive::Runtime;
    use crate::vdom::{h, Renderer};

    fn setup(factory: &AsyncComponent) -> (Runtime, Rc<MemoryHost>, Instance, crate::host::HostNode) {
        let rt = Runtime::new();
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&rt, host.clone());
        let root = host.container();
        let lazy = factory.clone();
        let app = ComponentDef::new("App")
            .render(move |vm| Ok(h("div").child(lazy.vnode(vm))))
            .build();
        let vm = renderer.mount_component(&app, &[], root).unwrap();
        (rt, host, vm, root)
    }

    #[test]
    fn test_placeholder_until_resolved() {
        let factory = AsyncComponent::new();
        let (rt, host, vm, root) = setup(&factory);
        assert_eq!(host.serialize(root), "<div><!----></div>");
        assert!(vm.children().is_empty());

        let chart = ComponentDef::new("Chart")
            .render(|_| Ok(h("canvas")))
            .build();
        factory.resolve(chart);
        rt.tick();

        assert_eq!(host.serialize(root), "<div><canvas></canvas></div>");
        assert_eq!(vm.children().len(), 1);
        assert!(factory.is_resolved());
    }

    #[test]
    fn test_rerender_while_pending_keeps_placeholder() {
        let factory = AsyncComponent::new();
        let (rt, host, vm, root) = setup(&factory);
        host.clear_ops();

        vm.force_update();
        rt.tick();
        assert_eq!(host.counts().total(), 0);
        assert_eq!(host.serialize(root), "<div><!----></div>");
    }

    #[test]
    fn test_reject_renders_error_component() {
        let oops = ComponentDef::new("Oops")
            .render(|_| Ok(h("em").text_content("failed")))
            .build();
        let factory = AsyncComponent::new().error(&oops);
        let (rt, host, _vm, root) = setup(&factory);

        factory.reject("network down");
        rt.tick();
        assert!(factory.is_failed());
        assert_eq!(host.serialize(root), "<div><em>failed</em></div>");
    }

    #[test]
    fn test_loading_component_shown_while_pending() {
        let spinner = ComponentDef::new("Spinner")
            .render(|_| Ok(h("progress")))
            .build();
        let factory = AsyncComponent::new().loading(&spinner);
        let (_rt, host, _vm, root) = setup(&factory);
        assert_eq!(host.serialize(root), "<div><progress></progress></div>");
    }
}
