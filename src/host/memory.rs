//! In-memory host tree with an operation log.
//!
//! `MemoryHost` is the reference adapter: an arena of nodes plus a record of
//! every operation the reconciler issued. Tests assert on the resulting tree
//! through [`MemoryHost::serialize`] and on the amount of work through
//! [`MemoryHost::counts`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use super::{HostAdapter, HostNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Element,
    Text,
    Comment,
}

#[derive(Debug)]
struct MemNode {
    kind: NodeKind,
    /// Tag for elements, content for text and comments.
    text: Rc<str>,
    attrs: BTreeMap<Rc<str>, Rc<str>>,
    parent: Option<HostNode>,
    children: Vec<HostNode>,
}

/// One recorded host operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { node: HostNode, tag: Rc<str> },
    CreateText { node: HostNode, text: Rc<str> },
    CreateComment { node: HostNode, text: Rc<str> },
    SetText { node: HostNode, text: Rc<str> },
    /// `moved` is set when the node was attached before the call.
    Insert {
        parent: HostNode,
        node: HostNode,
        reference: Option<HostNode>,
        moved: bool,
    },
    Remove { parent: HostNode, node: HostNode },
    SetAttribute { node: HostNode, name: Rc<str>, value: Rc<str> },
    RemoveAttribute { node: HostNode, name: Rc<str> },
}

/// Operation totals by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub created: usize,
    /// Insertions of detached nodes.
    pub inserted: usize,
    /// Insertions of nodes that were already attached.
    pub moved: usize,
    pub removed: usize,
    pub text_updates: usize,
    pub attribute_updates: usize,
}

impl OpCounts {
    /// Every operation that touches the tree.
    pub fn total(&self) -> usize {
        self.created + self.inserted + self.moved + self.removed + self.text_updates + self.attribute_updates
    }
}

/// Arena-backed [`HostAdapter`].
#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: RefCell<Vec<MemNode>>,
    ops: RefCell<Vec<HostOp>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A detached root element to mount into. Not recorded.
    pub fn container(&self) -> HostNode {
        self.alloc(NodeKind::Element, "root".into())
    }

    fn alloc(&self, kind: NodeKind, text: Rc<str>) -> HostNode {
        let mut nodes = self.nodes.borrow_mut();
        let handle = HostNode::new(nodes.len() as u64);
        nodes.push(MemNode {
            kind,
            text,
            attrs: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        });
        handle
    }

    fn record(&self, op: HostOp) {
        self.ops.borrow_mut().push(op);
    }

    fn detach(nodes: &mut [MemNode], node: HostNode) {
        let Some(parent) = nodes.get(node.raw() as usize).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = nodes.get_mut(parent.raw() as usize) {
            p.children.retain(|child| *child != node);
        }
        if let Some(n) = nodes.get_mut(node.raw() as usize) {
            n.parent = None;
        }
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.borrow().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn counts(&self) -> OpCounts {
        let mut counts = OpCounts::default();
        for op in self.ops.borrow().iter() {
            match op {
                HostOp::CreateElement { .. } | HostOp::CreateText { .. } | HostOp::CreateComment { .. } => {
                    counts.created += 1
                }
                HostOp::SetText { .. } => counts.text_updates += 1,
                HostOp::Insert { moved: true, .. } => counts.moved += 1,
                HostOp::Insert { moved: false, .. } => counts.inserted += 1,
                HostOp::Remove { .. } => counts.removed += 1,
                HostOp::SetAttribute { .. } | HostOp::RemoveAttribute { .. } => counts.attribute_updates += 1,
            }
        }
        counts
    }

    pub fn children_of(&self, node: HostNode) -> Vec<HostNode> {
        self.nodes
            .borrow()
            .get(node.raw() as usize)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Text of a text or comment node.
    pub fn text_of(&self, node: HostNode) -> Option<Rc<str>> {
        let nodes = self.nodes.borrow();
        let n = nodes.get(node.raw() as usize)?;
        (n.kind != NodeKind::Element).then(|| n.text.clone())
    }

    pub fn attribute(&self, node: HostNode, name: &str) -> Option<Rc<str>> {
        self.nodes.borrow().get(node.raw() as usize)?.attrs.get(name).cloned()
    }

    /// Compact markup of the subtree under `node`, excluding `node` itself
    /// when it is a container.
    pub fn serialize(&self, node: HostNode) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        if let Some(n) = nodes.get(node.raw() as usize) {
            for child in &n.children {
                write_node(&nodes, *child, &mut out);
            }
        }
        out
    }

    /// Markup of `node` including itself.
    pub fn serialize_node(&self, node: HostNode) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        write_node(&nodes, node, &mut out);
        out
    }
}

fn write_node(nodes: &[MemNode], node: HostNode, out: &mut String) {
    let Some(n) = nodes.get(node.raw() as usize) else {
        return;
    };
    match n.kind {
        NodeKind::Text => out.push_str(&n.text),
        NodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", n.text);
        }
        NodeKind::Element => {
            let _ = write!(out, "<{}", n.text);
            for (name, value) in &n.attrs {
                let _ = write!(out, " {name}=\"{value}\"");
            }
            out.push('>');
            for child in &n.children {
                write_node(nodes, *child, out);
            }
            let _ = write!(out, "</{}>", n.text);
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let node = self.alloc(NodeKind::Element, tag.into());
        self.record(HostOp::CreateElement { node, tag: tag.into() });
        node
    }

    fn create_text(&self, text: &str) -> HostNode {
        let node = self.alloc(NodeKind::Text, text.into());
        self.record(HostOp::CreateText { node, text: text.into() });
        node
    }

    fn create_comment(&self, text: &str) -> HostNode {
        let node = self.alloc(NodeKind::Comment, text.into());
        self.record(HostOp::CreateComment { node, text: text.into() });
        node
    }

    fn set_text(&self, node: HostNode, text: &str) {
        let is_element = {
            let nodes = self.nodes.borrow();
            nodes.get(node.raw() as usize).map(|n| n.kind == NodeKind::Element)
        };
        match is_element {
            Some(true) => {
                let old_children = self.children_of(node);
                let text_node = self.alloc(NodeKind::Text, text.into());
                let mut nodes = self.nodes.borrow_mut();
                for child in old_children {
                    if let Some(c) = nodes.get_mut(child.raw() as usize) {
                        c.parent = None;
                    }
                }
                if let Some(n) = nodes.get_mut(node.raw() as usize) {
                    n.children = if text.is_empty() { Vec::new() } else { vec![text_node] };
                }
                if !text.is_empty() {
                    if let Some(t) = nodes.get_mut(text_node.raw() as usize) {
                        t.parent = Some(node);
                    }
                }
            }
            Some(false) => {
                if let Some(n) = self.nodes.borrow_mut().get_mut(node.raw() as usize) {
                    n.text = text.into();
                }
            }
            None => return,
        }
        self.record(HostOp::SetText { node, text: text.into() });
    }

    fn insert_before(&self, parent: HostNode, node: HostNode, reference: Option<HostNode>) {
        let moved = {
            let mut nodes = self.nodes.borrow_mut();
            let moved = nodes.get(node.raw() as usize).is_some_and(|n| n.parent.is_some());
            Self::detach(&mut nodes, node);
            if let Some(p) = nodes.get_mut(parent.raw() as usize) {
                let at = reference
                    .and_then(|r| p.children.iter().position(|c| *c == r))
                    .unwrap_or(p.children.len());
                p.children.insert(at, node);
            }
            if let Some(n) = nodes.get_mut(node.raw() as usize) {
                n.parent = Some(parent);
            }
            moved
        };
        self.record(HostOp::Insert {
            parent,
            node,
            reference,
            moved,
        });
    }

    fn append(&self, parent: HostNode, node: HostNode) {
        self.insert_before(parent, node, None);
    }

    fn remove(&self, parent: HostNode, node: HostNode) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes.get(node.raw() as usize).and_then(|n| n.parent) != Some(parent) {
                return;
            }
            Self::detach(&mut nodes, node);
        }
        self.record(HostOp::Remove { parent, node });
    }

    fn parent_of(&self, node: HostNode) -> Option<HostNode> {
        self.nodes.borrow().get(node.raw() as usize)?.parent
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(node.raw() as usize)?.parent?;
        let siblings = &nodes.get(parent.raw() as usize)?.children;
        let at = siblings.iter().position(|c| *c == node)?;
        siblings.get(at + 1).copied()
    }

    fn tag_name(&self, node: HostNode) -> Option<Rc<str>> {
        let nodes = self.nodes.borrow();
        let n = nodes.get(node.raw() as usize)?;
        (n.kind == NodeKind::Element).then(|| n.text.clone())
    }

    fn set_attribute(&self, node: HostNode, name: &str, value: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node.raw() as usize) {
            n.attrs.insert(name.into(), value.into());
        }
        self.record(HostOp::SetAttribute {
            node,
            name: name.into(),
            value: value.into(),
        });
    }

    fn remove_attribute(&self, node: HostNode, name: &str) {
        if let Some(n) = self.nodes.borrow_mut().get_mut(node.raw() as usize) {
            n.attrs.remove(name);
        }
        self.record(HostOp::RemoveAttribute { node, name: name.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_serialize() {
        let host = MemoryHost::new();
        let root = host.container();
        let div = host.create_element("div");
        host.set_attribute(div, "id", "main");
        let text = host.create_text("hi");
        host.append(div, text);
        host.append(root, div);
        host.append(root, host.create_comment("end"));

        assert_eq!(host.serialize(root), "<div id=\"main\">hi</div><!--end-->");
        assert_eq!(host.parent_of(text), Some(div));
        assert_eq!(host.tag_name(div).as_deref(), Some("div"));
        assert_eq!(host.tag_name(text), None);
    }

    #[test]
    fn test_insert_before_moves_attached_node() {
        let host = MemoryHost::new();
        let root = host.container();
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.append(root, a);
        host.append(root, b);
        host.clear_ops();

        host.insert_before(root, b, Some(a));
        assert_eq!(host.serialize(root), "ba");
        assert_eq!(host.next_sibling(b), Some(a));
        assert_eq!(host.next_sibling(a), None);
        assert_eq!(host.counts(), OpCounts { moved: 1, ..OpCounts::default() });
    }

    #[test]
    fn test_remove_requires_matching_parent() {
        let host = MemoryHost::new();
        let root = host.container();
        let other = host.container();
        let a = host.create_text("a");
        host.append(root, a);

        host.remove(other, a);
        assert_eq!(host.children_of(root), vec![a]);
        host.remove(root, a);
        assert!(host.children_of(root).is_empty());
        assert_eq!(host.parent_of(a), None);
    }

    #[test]
    fn test_set_text_on_element_replaces_children() {
        let host = MemoryHost::new();
        let root = host.container();
        let p = host.create_element("p");
        host.append(root, p);
        host.append(p, host.create_element("b"));

        host.set_text(p, "plain");
        assert_eq!(host.serialize(root), "<p>plain</p>");
        host.set_text(p, "");
        assert_eq!(host.serialize(root), "<p></p>");
    }
}
