//! Renderer - materializes and patches virtual trees against a host.
//!
//! ```text
//! patch(old, new)
//!   ├─ new absent        → remove old + teardown (children first)
//!   ├─ old absent        → create_elm(new)      (children before parent insert)
//!   ├─ same_vnode        → patch_vnode          (reuse host node, diff children)
//!   └─ otherwise         → create new at old's position, remove old
//! ```
//!
//! Insert hooks (including component `mounted`) are queued while a tree is
//! built and run once the whole tree is attached, so nested hooks fire
//! children first.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::attrs::AttrsModule;
use super::hooks::{Module, RemoveHandle};
use super::vnode::{same_vnode, VNode, VNodeFlags};
use crate::component::Instance;
use crate::error::{Result, Warning};
use crate::host::{HostAdapter, HostNode};
use crate::reactive::{Runtime, Task};

/// Callbacks deferred until the patched tree is attached.
pub(crate) type InsertQueue = Vec<Task>;

/// Options for [`Renderer::patch_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// Diff children logically but never reorder host nodes. Used while
    /// exit transitions are still running on the old nodes.
    pub remove_only: bool,
}

pub(crate) struct RendererInner {
    runtime: Runtime,
    host: Rc<dyn HostAdapter>,
    modules: Vec<Rc<dyn Module>>,
    /// Instances whose tree is being patched, innermost last.
    active: RefCell<Vec<Instance>>,
}

/// Reconciler bound to one host adapter. Cheap to clone.
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

impl Renderer {
    /// Renderer with the built-in attribute module.
    pub fn new(runtime: &Runtime, host: Rc<dyn HostAdapter>) -> Self {
        Self::with_modules(runtime, host, vec![Rc::new(AttrsModule)])
    }

    pub fn with_modules(runtime: &Runtime, host: Rc<dyn HostAdapter>, modules: Vec<Rc<dyn Module>>) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                runtime: runtime.clone(),
                host,
                modules,
                active: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn host(&self) -> &Rc<dyn HostAdapter> {
        &self.inner.host
    }

    pub fn ptr_eq(&self, other: &Renderer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Materialize `vnode` and append it to `container`.
    pub fn mount(&self, container: HostNode, mut vnode: VNode) -> Result<VNode> {
        let mut queue = InsertQueue::new();
        self.create_elm(&mut vnode, &mut queue, Some(container), None)?;
        run_insert_queue(queue);
        tracing::debug!(uid = vnode.uid(), "mounted tree");
        Ok(vnode)
    }

    /// Reconcile `old` into `new`, returning the realized new tree.
    pub fn patch(&self, old: Option<VNode>, new: Option<VNode>) -> Result<Option<VNode>> {
        self.patch_with(old, new, PatchOptions::default())
    }

    pub fn patch_with(&self, old: Option<VNode>, new: Option<VNode>, options: PatchOptions) -> Result<Option<VNode>> {
        match (old, new) {
            (None, None) => Ok(None),
            (Some(old), None) => {
                self.remove_vnodes(vec![old]);
                Ok(None)
            }
            (None, Some(mut new)) => {
                let mut queue = InsertQueue::new();
                self.create_elm(&mut new, &mut queue, None, None)?;
                run_insert_queue(queue);
                Ok(Some(new))
            }
            (Some(old), Some(mut new)) => {
                let mut queue = InsertQueue::new();
                self.patch_root(old, &mut new, &mut queue, options.remove_only)?;
                run_insert_queue(queue);
                Ok(Some(new))
            }
        }
    }

    // =========================================================================
    // Instance Support
    // =========================================================================

    /// Build a detached tree, collecting insert callbacks into `queue`.
    pub(crate) fn create_tree(&self, vnode: &mut VNode, queue: &mut InsertQueue) -> Result<()> {
        self.create_elm(vnode, queue, None, None)
    }

    pub(crate) fn patch_tree(&self, old: VNode, new: &mut VNode, queue: &mut InsertQueue) -> Result<()> {
        self.patch_root(old, new, queue, false)
    }

    /// Teardown without detaching the root host node.
    pub(crate) fn teardown_tree(&self, vnode: &VNode) {
        self.invoke_destroy_hook(vnode);
    }

    pub(crate) fn push_active(&self, instance: Instance) {
        self.inner.active.borrow_mut().push(instance);
    }

    pub(crate) fn pop_active(&self) {
        let popped = self.inner.active.borrow_mut().pop();
        drop(popped);
    }

    /// Instance whose tree is currently being patched.
    pub fn active_instance(&self) -> Option<Instance> {
        self.inner.active.borrow().last().cloned()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    fn patch_root(&self, old: VNode, new: &mut VNode, queue: &mut InsertQueue, remove_only: bool) -> Result<()> {
        if same_vnode(&old, new) {
            return self.patch_vnode(old, new, queue, remove_only);
        }
        let old_elm = old.elm();
        let parent = old_elm.and_then(|elm| self.inner.host.parent_of(elm));
        let reference = old_elm.and_then(|elm| self.inner.host.next_sibling(elm));
        self.create_elm(new, queue, parent, reference)?;
        if parent.is_some() {
            self.remove_vnodes(vec![old]);
        } else {
            self.invoke_destroy_hook(&old);
        }
        Ok(())
    }

    pub(crate) fn create_elm(
        &self,
        vnode: &mut VNode,
        queue: &mut InsertQueue,
        parent: Option<HostNode>,
        reference: Option<HostNode>,
    ) -> Result<()> {
        if vnode.component.is_some() {
            return self.create_component(vnode, queue, parent, reference);
        }
        let host = &self.inner.host;

        let elm = if let Some(tag) = vnode.tag.clone() {
            let elm = host.create_element(&tag);
            vnode.elm = Some(elm);
            if let Some(text) = vnode.text.clone() {
                let text = host.create_text(&text);
                host.append(elm, text);
            } else {
                self.check_duplicate_keys(&vnode.children);
                for child in vnode.children.iter_mut() {
                    self.create_elm(child, queue, Some(elm), None)?;
                }
            }
            if vnode.data.is_some() {
                self.invoke_create_hooks(vnode, queue);
            }
            elm
        } else {
            let text = vnode.text.clone().unwrap_or_else(|| "".into());
            let elm = if vnode.is_comment() {
                host.create_comment(&text)
            } else {
                host.create_text(&text)
            };
            vnode.elm = Some(elm);
            elm
        };

        self.insert(parent, elm, reference);
        Ok(())
    }

    fn create_component(
        &self,
        vnode: &mut VNode,
        queue: &mut InsertQueue,
        parent: Option<HostNode>,
        reference: Option<HostNode>,
    ) -> Result<()> {
        let Some(component) = vnode.component.clone() else {
            return Ok(());
        };
        let keep_alive = vnode.flags.contains(VNodeFlags::KEEP_ALIVE);

        let instance = match vnode.instance.clone() {
            Some(cached) if keep_alive && !cached.is_destroyed() => {
                tracing::debug!(component = %component.def.name(), "reactivating cached component");
                cached.update_from_vnode(&component);
                cached
            }
            _ => {
                let owner = self.active_instance();
                let instance = Instance::create_child(self, &component, owner.clone())?;
                queue.extend(instance.take_pending_insert());
                if let (Some(cache), Some(key)) = (&component.keep_alive, &component.cache_key) {
                    cache.store(key.clone(), instance.clone());
                    if let Some(owner) = &owner {
                        owner.adopt_cache(cache);
                    }
                }
                instance
            }
        };
        vnode.instance = Some(instance.clone());

        if let Some(el) = instance.el() {
            if vnode.data.is_some() {
                self.invoke_create_hooks(vnode, queue);
            }
            self.insert(parent, el, reference);
            if keep_alive {
                for module in &self.inner.modules {
                    module.activate(self.inner.host.as_ref(), vnode);
                }
            }
        }
        queue.push(Box::new(move || instance.on_inserted(keep_alive)));
        Ok(())
    }

    fn invoke_create_hooks(&self, vnode: &VNode, queue: &mut InsertQueue) {
        for module in &self.inner.modules {
            module.create(self.inner.host.as_ref(), vnode);
        }
        let Some(data) = &vnode.data else { return };
        if let Some(create) = &data.hooks.create {
            create(vnode);
        }
        if let Some(insert) = data.hooks.insert.clone() {
            let inserted = vnode.clone();
            queue.push(Box::new(move || insert(&inserted)));
        }
    }

    fn insert(&self, parent: Option<HostNode>, elm: HostNode, reference: Option<HostNode>) {
        let Some(parent) = parent else { return };
        let host = &self.inner.host;
        match reference.filter(|r| host.parent_of(*r) == Some(parent)) {
            Some(reference) => host.insert_before(parent, elm, Some(reference)),
            None => host.append(parent, elm),
        }
    }

    pub(crate) fn insert_before(&self, parent: HostNode, elm: Option<HostNode>, reference: Option<HostNode>) {
        if let Some(elm) = elm {
            self.inner.host.insert_before(parent, elm, reference);
        }
    }

    pub(crate) fn add_vnodes(
        &self,
        parent: HostNode,
        reference: Option<HostNode>,
        vnodes: &mut [VNode],
        queue: &mut InsertQueue,
    ) -> Result<()> {
        for vnode in vnodes {
            self.create_elm(vnode, queue, Some(parent), reference)?;
        }
        Ok(())
    }

    pub(crate) fn check_duplicate_keys(&self, children: &[VNode]) {
        let mut seen = HashSet::new();
        for key in children.iter().filter_map(|c| c.key.as_ref()) {
            if !seen.insert(key) {
                self.inner.runtime.warn(Warning::DuplicateKey { key: key.clone() });
            }
        }
    }

    // =========================================================================
    // Patching
    // =========================================================================

    pub(crate) fn patch_vnode(
        &self,
        old: VNode,
        new: &mut VNode,
        queue: &mut InsertQueue,
        remove_only: bool,
    ) -> Result<()> {
        if old.uid() == new.uid() {
            *new = old;
            return Ok(());
        }
        new.elm = old.elm;

        if old.is_async_placeholder() {
            new.flags |= VNodeFlags::ASYNC_PLACEHOLDER;
            return Ok(());
        }

        if old.is_static()
            && new.is_static()
            && old.key == new.key
            && new.flags.intersects(VNodeFlags::CLONED | VNodeFlags::ONCE)
        {
            new.instance = old.instance.clone();
            new.children = old.children;
            return Ok(());
        }

        if let Some(component) = new.component.clone() {
            new.instance = old.instance.clone();
            if let Some(instance) = &new.instance {
                instance.update_from_vnode(&component);
            }
        }

        if new.data.is_some() {
            for module in &self.inner.modules {
                module.update(self.inner.host.as_ref(), &old, &*new);
            }
            if let Some(update) = new.data.as_ref().and_then(|d| d.hooks.update.clone()) {
                update(&old, &*new);
            }
        }

        if new.component.is_some() {
            return Ok(());
        }
        let Some(elm) = new.elm else { return Ok(()) };
        let host = &self.inner.host;

        if new.tag.is_none() {
            if old.text != new.text {
                host.set_text(elm, new.text.as_deref().unwrap_or(""));
            }
            return Ok(());
        }

        match new.text.clone() {
            None => {
                let old_text = old.text.is_some();
                match (old.children.is_empty(), new.children.is_empty()) {
                    (false, false) => self.update_children(elm, old.children, &mut new.children, queue, remove_only)?,
                    (true, false) => {
                        self.check_duplicate_keys(&new.children);
                        if old_text {
                            host.set_text(elm, "");
                        }
                        self.add_vnodes(elm, None, &mut new.children, queue)?;
                    }
                    (false, true) => self.remove_vnodes(old.children),
                    (true, true) => {
                        if old_text {
                            host.set_text(elm, "");
                        }
                    }
                }
            }
            Some(text) => {
                if !old.children.is_empty() {
                    for child in &old.children {
                        self.invoke_destroy_hook(child);
                    }
                }
                if old.text.as_deref() != Some(&*text) || !old.children.is_empty() {
                    host.set_text(elm, &text);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Removal
    // =========================================================================

    pub(crate) fn remove_vnodes(&self, vnodes: impl IntoIterator<Item = VNode>) {
        for vnode in vnodes {
            if vnode.tag.is_some() || vnode.component.is_some() {
                self.remove_and_invoke_remove_hook(&vnode, None);
                self.invoke_destroy_hook(&vnode);
            } else if let Some(elm) = vnode.elm {
                self.remove_node(elm);
            }
        }
    }

    fn remove_node(&self, elm: HostNode) {
        if let Some(parent) = self.inner.host.parent_of(elm) {
            self.inner.host.remove(parent, elm);
        }
    }

    fn remove_and_invoke_remove_hook(&self, vnode: &VNode, handle: Option<RemoveHandle>) {
        let Some(elm) = vnode.elm() else { return };
        if handle.is_none() && vnode.data.is_none() && vnode.instance.is_none() {
            self.remove_node(elm);
            return;
        }
        let handle = handle.unwrap_or_else(|| RemoveHandle::new(self.inner.host.clone(), elm));

        // A component's root node gets the same removal hooks.
        if let Some(instance) = &vnode.instance {
            instance.with_root_vnode(|root| {
                if root.data.is_some() {
                    self.remove_and_invoke_remove_hook(root, Some(handle.clone()));
                }
            });
        }
        if vnode.data.is_some() {
            for module in &self.inner.modules {
                module.remove(self.inner.host.as_ref(), vnode, handle.clone());
            }
            if let Some(remove) = vnode.data.as_ref().and_then(|d| d.hooks.remove.clone()) {
                remove(vnode, handle.clone());
            }
        }
        drop(handle);
    }

    /// Teardown of a subtree: children first, then the node itself.
    fn invoke_destroy_hook(&self, vnode: &VNode) {
        for child in &vnode.children {
            self.invoke_destroy_hook(child);
        }
        if let Some(instance) = &vnode.instance {
            if !instance.is_destroyed() {
                if vnode.flags.contains(VNodeFlags::KEEP_ALIVE) {
                    instance.deactivate(true);
                } else {
                    instance.destroy();
                }
            }
        }
        if vnode.data.is_some() {
            for module in &self.inner.modules {
                module.destroy(vnode);
            }
            if let Some(destroy) = vnode.data.as_ref().and_then(|d| d.hooks.destroy.clone()) {
                destroy(vnode);
            }
        }
    }
}

pub(crate) fn run_insert_queue(queue: InsertQueue) {
    for task in queue {
        task();
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("modules", &self.inner.modules.len())
            .field("active", &self.inner.active.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, OpCounts};
    use crate::vdom::h;
    use std::cell::Cell;

    fn setup() -> (Rc<MemoryHost>, Renderer, HostNode) {
        let runtime = Runtime::new();
        let host = Rc::new(MemoryHost::new());
        let renderer = Renderer::new(&runtime, host.clone());
        let root = host.container();
        (host, renderer, root)
    }

    #[test]
    fn test_mount_builds_tree_children_first() {
        let (host, renderer, root) = setup();
        let tree = h("ul").children([h("li").text_content("a"), h("li").text_content("b")]);
        renderer.mount(root, tree).unwrap();

        assert_eq!(host.serialize(root), "<ul><li>a</li><li>b</li></ul>");
        // Only the outermost node is inserted into an attached parent last.
        let last = host.ops().last().cloned();
        assert!(matches!(last, Some(crate::host::HostOp::Insert { parent, .. }) if parent == root));
    }

    #[test]
    fn test_patch_identical_reference_is_free() {
        let (host, renderer, root) = setup();
        let tree = renderer
            .mount(root, h("div").child(h("span").text_content("x")))
            .unwrap();
        host.clear_ops();

        let same = tree.clone();
        renderer.patch(Some(tree), Some(same)).unwrap();
        assert_eq!(host.counts().total(), 0);
    }

    #[test]
    fn test_mount_then_remove_leaves_nothing() {
        let (host, renderer, root) = setup();
        let destroyed = Rc::new(Cell::new(0));
        let node = |label: &str| {
            let destroyed = destroyed.clone();
            h("li").text_content(label).hook_destroy(move |_| destroyed.set(destroyed.get() + 1))
        };
        let tree = h("ul")
            .hook_destroy({
                let destroyed = destroyed.clone();
                move |_| destroyed.set(destroyed.get() + 1)
            })
            .children([node("a"), node("b"), node("c")]);

        let tree = renderer.mount(root, tree).unwrap();
        renderer.patch(Some(tree), None).unwrap();

        assert!(host.children_of(root).is_empty());
        assert_eq!(destroyed.get(), 4);
    }

    #[test]
    fn test_destroy_runs_children_before_parent() {
        let (_host, renderer, root) = setup();
        let order = Rc::new(RefCell::new(Vec::new()));
        let hook = |name: &'static str| {
            let order = order.clone();
            move |_: &VNode| order.borrow_mut().push(name)
        };
        let tree = h("div")
            .hook_destroy(hook("parent"))
            .child(h("p").hook_destroy(hook("child")));
        let tree = renderer.mount(root, tree).unwrap();
        renderer.patch(Some(tree), None).unwrap();
        assert_eq!(*order.borrow(), vec!["child", "parent"]);
    }

    #[test]
    fn test_different_root_is_replaced_in_place() {
        let (host, renderer, root) = setup();
        let before = renderer.mount(root, h("p").text_content("old")).unwrap();
        host.append(root, host.create_comment("after"));

        renderer.patch(Some(before), Some(h("section").text_content("new"))).unwrap();
        assert_eq!(host.serialize(root), "<section>new</section><!--after-->");
    }

    #[test]
    fn test_text_change_is_single_op() {
        let (host, renderer, root) = setup();
        let old = renderer.mount(root, h("p").child(VNode::text("a"))).unwrap();
        host.clear_ops();
        renderer.patch(Some(old), Some(h("p").child(VNode::text("b")))).unwrap();
        assert_eq!(host.counts(), OpCounts { text_updates: 1, ..OpCounts::default() });
        assert_eq!(host.serialize(root), "<p>b</p>");
    }

    #[test]
    fn test_children_to_text_and_back() {
        let (host, renderer, root) = setup();
        let old = renderer.mount(root, h("p").child(h("b"))).unwrap();
        let mid = renderer.patch(Some(old), Some(h("p").text_content("t"))).unwrap();
        assert_eq!(host.serialize(root), "<p>t</p>");
        renderer.patch(mid, Some(h("p").child(h("i")))).unwrap();
        assert_eq!(host.serialize(root), "<p><i></i></p>");
    }

    #[test]
    fn test_insert_hooks_run_after_attach() {
        let (host, renderer, root) = setup();
        let attached = Rc::new(Cell::new(false));
        let seen = attached.clone();
        let host_view = host.clone();
        let tree = h("div").child(h("span").hook_insert(move |vnode| {
            let elm = vnode.elm().unwrap();
            let parent = host_view.parent_of(elm).unwrap();
            seen.set(host_view.parent_of(parent).is_some());
        }));
        renderer.mount(root, tree).unwrap();
        assert!(attached.get());
    }

    #[test]
    fn test_static_clone_skips_diff() {
        let (host, renderer, root) = setup();
        let hoisted = h("div").mark_static().child(h("b").text_content("static"));
        let old = renderer.mount(root, hoisted.clone_vnode()).unwrap();
        host.clear_ops();

        let new = renderer.patch(Some(old), Some(hoisted.clone_vnode())).unwrap().unwrap();
        assert_eq!(host.counts().total(), 0);
        assert!(new.elm().is_some());
    }

    #[test]
    fn test_remove_hook_can_delay_detach() {
        let (host, renderer, root) = setup();
        let held = Rc::new(RefCell::new(None));
        let keep = held.clone();
        let tree = h("div").hook_remove(move |_, done| *keep.borrow_mut() = Some(done));
        let tree = renderer.mount(root, tree).unwrap();

        renderer.patch(Some(tree), None).unwrap();
        assert_eq!(host.children_of(root).len(), 1, "removal waits for the hook");
        held.borrow_mut().take();
        assert!(host.children_of(root).is_empty());
    }
}
