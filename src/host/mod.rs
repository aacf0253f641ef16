//! Host adapter - the seam between the reconciler and a concrete tree.
//!
//! The reconciler never touches a real host tree. It speaks the small set of
//! operations below, and an adapter maps them onto whatever the platform
//! provides (a DOM, a terminal cell tree, a native widget hierarchy).
//! Host nodes are opaque copyable handles allocated by the adapter.

mod memory;

use std::rc::Rc;

pub use memory::{HostOp, MemoryHost, OpCounts};

/// Opaque handle to a node owned by a [`HostAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(u64);

impl HostNode {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Host tree operations used by the reconciler.
///
/// Methods take `&self`; adapters use interior mutability so that one adapter
/// can be shared by a renderer and the component instances it mounts.
pub trait HostAdapter {
    fn create_element(&self, tag: &str) -> HostNode;

    fn create_text(&self, text: &str) -> HostNode;

    fn create_comment(&self, text: &str) -> HostNode;

    /// Replace the text of a text or comment node, or the whole content of
    /// an element.
    fn set_text(&self, node: HostNode, text: &str);

    /// Insert `node` into `parent` before `reference`, detaching it from its
    /// current position first. A `None` reference appends.
    fn insert_before(&self, parent: HostNode, node: HostNode, reference: Option<HostNode>);

    fn append(&self, parent: HostNode, node: HostNode);

    fn remove(&self, parent: HostNode, node: HostNode);

    fn parent_of(&self, node: HostNode) -> Option<HostNode>;

    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;

    /// Tag of an element node. `None` for text and comments.
    fn tag_name(&self, node: HostNode) -> Option<Rc<str>>;

    fn set_attribute(&self, _node: HostNode, _name: &str, _value: &str) {}

    fn remove_attribute(&self, _node: HostNode, _name: &str) {}
}
