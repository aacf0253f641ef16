//! Behavior hooks attached to nodes, and platform modules.
//!
//! Per-node hooks live in a node's [`VNodeHooks`]. Platform modules implement
//! [`Module`] and see every node that carries data; they are how attributes,
//! classes, styles or event bindings reach the host.
//!
//! Removal goes through a [`RemoveHandle`]: the host node is detached when
//! the last clone of the handle is dropped. A hook that animates an exit
//! keeps its clone until the animation ends.

use std::fmt;
use std::rc::Rc;

use super::vnode::VNode;
use crate::host::{HostAdapter, HostNode};

pub type NodeHook = Rc<dyn Fn(&VNode)>;

/// Receives `(old, new)`.
pub type UpdateHook = Rc<dyn Fn(&VNode, &VNode)>;

pub type RemoveHook = Rc<dyn Fn(&VNode, RemoveHandle)>;

/// Per-node lifecycle hooks.
#[derive(Clone, Default)]
pub struct VNodeHooks {
    /// After the host node and its children exist, before insertion.
    pub create: Option<NodeHook>,
    /// After the whole patched tree is attached.
    pub insert: Option<NodeHook>,
    pub update: Option<UpdateHook>,
    /// Before detaching. Detachment waits for the handle.
    pub remove: Option<RemoveHook>,
    /// During teardown, after the node's children.
    pub destroy: Option<NodeHook>,
}

impl VNodeHooks {
    pub fn is_empty(&self) -> bool {
        self.create.is_none()
            && self.insert.is_none()
            && self.update.is_none()
            && self.remove.is_none()
            && self.destroy.is_none()
    }
}

impl fmt::Debug for VNodeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNodeHooks")
            .field("create", &self.create.is_some())
            .field("insert", &self.insert.is_some())
            .field("update", &self.update.is_some())
            .field("remove", &self.remove.is_some())
            .field("destroy", &self.destroy.is_some())
            .finish()
    }
}

/// A platform behavior module.
pub trait Module {
    fn create(&self, _host: &dyn HostAdapter, _vnode: &VNode) {}

    fn update(&self, _host: &dyn HostAdapter, _old: &VNode, _vnode: &VNode) {}

    /// Dropping `done` without keeping a clone completes immediately.
    fn remove(&self, _host: &dyn HostAdapter, _vnode: &VNode, done: RemoveHandle) {
        done.done();
    }

    fn destroy(&self, _vnode: &VNode) {}

    /// A cached component subtree was re-inserted.
    fn activate(&self, _host: &dyn HostAdapter, _vnode: &VNode) {}
}

// =============================================================================
// Remove Handle
// =============================================================================

struct PendingRemoval {
    host: Rc<dyn HostAdapter>,
    elm: HostNode,
}

impl Drop for PendingRemoval {
    fn drop(&mut self) {
        if let Some(parent) = self.host.parent_of(self.elm) {
            self.host.remove(parent, self.elm);
        }
    }
}

/// Reference-counted completion for a host node removal.
#[derive(Clone)]
pub struct RemoveHandle {
    pending: Rc<PendingRemoval>,
}

impl RemoveHandle {
    pub(crate) fn new(host: Rc<dyn HostAdapter>, elm: HostNode) -> Self {
        Self {
            pending: Rc::new(PendingRemoval { host, elm }),
        }
    }

    /// Node that will be detached.
    pub fn node(&self) -> HostNode {
        self.pending.elm
    }

    /// Clones still outstanding, including this one.
    pub fn listeners(&self) -> usize {
        Rc::strong_count(&self.pending)
    }

    /// Signal completion for this listener.
    pub fn done(self) {}
}

impl fmt::Debug for RemoveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveHandle")
            .field("node", &self.pending.elm)
            .field("listeners", &self.listeners())
            .finish()
    }
}
