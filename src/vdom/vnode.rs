//! VNode - one node of a virtual tree.
//!
//! A virtual tree describes the desired host tree for one render pass.
//! Nodes are plain owned values built with [`h`] and the builder methods
//! below; the reconciler fills in the realized host node (`elm`) while
//! materializing or patching.
//!
//! # Kinds
//!
//! | Kind      | `tag`   | `component` | flags                     |
//! |-----------|---------|-------------|---------------------------|
//! | element   | `Some`  | `None`      |                           |
//! | text      | `None`  | `None`      |                           |
//! | comment   | `None`  | `None`      | `COMMENT`                 |
//! | component | `None`  | `Some`      |                           |
//! | async     | `None`  | `None`      | `COMMENT \| ASYNC_PLACEHOLDER` |

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use super::hooks::{NodeHook, RemoveHook, UpdateHook, VNodeHooks};
use crate::component::{AsyncComponent, ComponentDef, Instance, KeepAlive, Listener};
use crate::host::HostNode;
use crate::reactive::Value;

thread_local! {
    static NEXT_UID: Cell<u64> = const { Cell::new(1) };
}

fn next_uid() -> u64 {
    NEXT_UID.with(|uid| {
        let id = uid.get();
        uid.set(id + 1);
        id
    })
}

// =============================================================================
// Key
// =============================================================================

/// Sibling identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(value: Rc<str>) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

bitflags! {
    /// Node flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VNodeFlags: u8 {
        const COMMENT = 1 << 0;
        /// Subtree never changes between renders.
        const STATIC = 1 << 1;
        /// Rendered once, then reused.
        const ONCE = 1 << 2;
        /// Produced by [`VNode::clone_vnode`].
        const CLONED = 1 << 3;
        /// Stand-in for an async component that has not resolved.
        const ASYNC_PLACEHOLDER = 1 << 4;
        /// Component node whose instance is cached instead of destroyed.
        const KEEP_ALIVE = 1 << 5;
    }
}

// =============================================================================
// Data Payloads
// =============================================================================

/// Attribute and behavior payload of a node.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub attrs: BTreeMap<Rc<str>, Rc<str>>,
    pub hooks: VNodeHooks,
}

/// Component descriptor carried by a placeholder node.
#[derive(Clone)]
pub struct ComponentVNode {
    pub def: Rc<ComponentDef>,
    pub props: BTreeMap<Rc<str>, Value>,
    pub listeners: BTreeMap<Rc<str>, Listener>,
    /// Default slot content.
    pub slot: Vec<VNode>,
    pub(crate) keep_alive: Option<KeepAlive>,
    pub(crate) cache_key: Option<Rc<str>>,
}

impl ComponentVNode {
    pub fn new(def: Rc<ComponentDef>) -> Self {
        Self {
            def,
            props: BTreeMap::new(),
            listeners: BTreeMap::new(),
            slot: Vec::new(),
            keep_alive: None,
            cache_key: None,
        }
    }
}

// =============================================================================
// VNode
// =============================================================================

/// A virtual tree node.
///
/// `Clone` keeps the node's identity: patching a node against its own clone
/// is a no-op. Use [`VNode::clone_vnode`] for a copy with a fresh identity.
#[derive(Clone)]
pub struct VNode {
    uid: u64,
    pub tag: Option<Rc<str>>,
    pub key: Option<Key>,
    pub data: Option<VNodeData>,
    pub children: Vec<VNode>,
    /// Content of text and comment nodes, or the text content of an element.
    pub text: Option<Rc<str>>,
    pub flags: VNodeFlags,
    pub(crate) elm: Option<HostNode>,
    pub(crate) component: Option<ComponentVNode>,
    pub(crate) instance: Option<Instance>,
    pub(crate) async_factory: Option<AsyncComponent>,
}

/// Element node.
pub fn h(tag: &str) -> VNode {
    VNode::blank(Some(tag.into()), None, VNodeFlags::empty())
}

impl VNode {
    fn blank(tag: Option<Rc<str>>, text: Option<Rc<str>>, flags: VNodeFlags) -> Self {
        Self {
            uid: next_uid(),
            tag,
            key: None,
            data: None,
            children: Vec::new(),
            text,
            flags,
            elm: None,
            component: None,
            instance: None,
            async_factory: None,
        }
    }

    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Self::blank(None, Some(text.into()), VNodeFlags::empty())
    }

    pub fn comment(text: impl Into<Rc<str>>) -> Self {
        Self::blank(None, Some(text.into()), VNodeFlags::COMMENT)
    }

    /// Placeholder for a component instance.
    pub fn component(def: &Rc<ComponentDef>) -> Self {
        let mut node = Self::blank(None, None, VNodeFlags::empty());
        node.component = Some(ComponentVNode::new(def.clone()));
        node
    }

    pub(crate) fn async_placeholder(factory: &AsyncComponent) -> Self {
        let mut node = Self::comment("");
        node.flags |= VNodeFlags::ASYNC_PLACEHOLDER;
        node.async_factory = Some(factory.clone());
        node
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// The realized host node. For components, the instance's root node.
    pub fn elm(&self) -> Option<HostNode> {
        match &self.instance {
            Some(instance) => instance.el(),
            None => self.elm,
        }
    }

    pub fn is_comment(&self) -> bool {
        self.flags.contains(VNodeFlags::COMMENT)
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(VNodeFlags::STATIC)
    }

    pub fn is_async_placeholder(&self) -> bool {
        self.flags.contains(VNodeFlags::ASYNC_PLACEHOLDER)
    }

    pub fn is_component(&self) -> bool {
        self.component.is_some()
    }

    pub fn component_def(&self) -> Option<&Rc<ComponentDef>> {
        self.component.as_ref().map(|c| &c.def)
    }

    pub fn component_instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn attr_value(&self, name: &str) -> Option<&Rc<str>> {
        self.data.as_ref()?.attrs.get(name)
    }

    fn data_mut(&mut self) -> &mut VNodeData {
        self.data.get_or_insert_with(VNodeData::default)
    }

    // =========================================================================
    // Builders
    // =========================================================================

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<Rc<str>>) -> Self {
        self.data_mut().attrs.insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Element text content. Replaces children.
    pub fn text_content(mut self, text: impl Into<Rc<str>>) -> Self {
        self.children.clear();
        self.text = Some(text.into());
        self
    }

    pub fn hook_create(mut self, hook: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hooks.create = Some(Rc::new(hook) as NodeHook);
        self
    }

    pub fn hook_insert(mut self, hook: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hooks.insert = Some(Rc::new(hook) as NodeHook);
        self
    }

    pub fn hook_update(mut self, hook: impl Fn(&VNode, &VNode) + 'static) -> Self {
        self.data_mut().hooks.update = Some(Rc::new(hook) as UpdateHook);
        self
    }

    pub fn hook_remove(mut self, hook: impl Fn(&VNode, super::RemoveHandle) + 'static) -> Self {
        self.data_mut().hooks.remove = Some(Rc::new(hook) as RemoveHook);
        self
    }

    pub fn hook_destroy(mut self, hook: impl Fn(&VNode) + 'static) -> Self {
        self.data_mut().hooks.destroy = Some(Rc::new(hook) as NodeHook);
        self
    }

    /// Pass a prop to a component node. Ignored on other nodes.
    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(component) = self.component.as_mut() {
            component.props.insert(name.into(), value.into());
        }
        self
    }

    /// Listen to an event emitted by a component node.
    pub fn on(mut self, event: &str, listener: impl Fn(&[Value]) -> anyhow::Result<()> + 'static) -> Self {
        if let Some(component) = self.component.as_mut() {
            component.listeners.insert(event.into(), Rc::new(listener));
        }
        self
    }

    /// Default slot content of a component node.
    pub fn slot(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        if let Some(component) = self.component.as_mut() {
            component.slot.extend(children);
        }
        self
    }

    pub fn mark_static(mut self) -> Self {
        self.flags |= VNodeFlags::STATIC;
        self
    }

    pub fn mark_once(mut self) -> Self {
        self.flags |= VNodeFlags::STATIC | VNodeFlags::ONCE;
        self
    }

    /// Deep copy with fresh identities and no host nodes attached, flagged
    /// as cloned. Used to reuse hoisted static subtrees.
    pub fn clone_vnode(&self) -> VNode {
        VNode {
            uid: next_uid(),
            tag: self.tag.clone(),
            key: self.key.clone(),
            data: self.data.clone(),
            children: self.children.iter().map(VNode::clone_vnode).collect(),
            text: self.text.clone(),
            flags: self.flags | VNodeFlags::CLONED,
            elm: None,
            component: self.component.clone(),
            instance: None,
            async_factory: self.async_factory.clone(),
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("uid", &self.uid);
        if let Some(tag) = &self.tag {
            s.field("tag", tag);
        }
        if let Some(component) = &self.component {
            s.field("component", &component.def.name());
        }
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if let Some(text) = &self.text {
            s.field("text", text);
        }
        if !self.flags.is_empty() {
            s.field("flags", &self.flags);
        }
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.field("elm", &self.elm()).finish()
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Whether `a` and `b` describe the same logical node across renders.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    if a.key != b.key || !same_factory(a, b) {
        return false;
    }
    let same_shape = a.tag == b.tag
        && a.is_comment() == b.is_comment()
        && a.data.is_some() == b.data.is_some()
        && same_input_type(a, b)
        && same_component(a, b);
    same_shape
        || (a.is_async_placeholder()
            && b.is_async_placeholder()
            && b.async_factory.as_ref().is_some_and(|factory| !factory.is_failed()))
}

fn same_factory(a: &VNode, b: &VNode) -> bool {
    match (&a.async_factory, &b.async_factory) {
        (None, None) => true,
        (Some(x), Some(y)) => x.ptr_eq(y),
        _ => false,
    }
}

fn same_component(a: &VNode, b: &VNode) -> bool {
    match (&a.component, &b.component) {
        (None, None) => true,
        (Some(x), Some(y)) => Rc::ptr_eq(&x.def, &y.def),
        _ => false,
    }
}

fn same_input_type(a: &VNode, b: &VNode) -> bool {
    if a.tag.as_deref() != Some("input") {
        return true;
    }
    a.attr_value("type") == b.attr_value("type")
}
