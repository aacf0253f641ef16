//! Child-list reconciliation.
//!
//! Four pointers walk the old and new child lists from both ends. Common UI
//! list operations (append, prepend, remove, reverse, a single move) resolve
//! through the end comparisons in linear host work; everything else falls
//! back to a key lookup over the remaining old range.
//!
//! ```text
//! old: [os ............ oe)      os/oe: old start/end (end exclusive)
//! new: [ns ............ ne)      ns/ne: new start/end (end exclusive)
//!
//!  os≡ns → patch, advance starts      oe≡ne → patch, retreat ends
//!  os≡ne → patch, move after old end  oe≡ns → patch, move before old start
//!  else  → key lookup: patch+move, or create before old start
//! ```

use std::collections::HashMap;

use super::patch::{InsertQueue, Renderer};
use super::vnode::{same_vnode, Key, VNode};
use crate::error::Result;
use crate::host::HostNode;

impl Renderer {
    pub(crate) fn update_children(
        &self,
        parent: HostNode,
        old_children: Vec<VNode>,
        new_children: &mut [VNode],
        queue: &mut InsertQueue,
        remove_only: bool,
    ) -> Result<()> {
        let can_move = !remove_only;
        let host = self.host().clone();
        self.check_duplicate_keys(new_children);

        // Consumed old slots become `None`.
        let mut old: Vec<Option<VNode>> = old_children.into_iter().map(Some).collect();
        let (mut os, mut oe) = (0, old.len());
        let (mut ns, mut ne) = (0, new_children.len());
        let mut key_map: Option<HashMap<Key, usize>> = None;

        while os < oe && ns < ne {
            let Some(old_start) = old[os].as_ref() else {
                os += 1;
                continue;
            };
            let Some(old_end) = old[oe - 1].as_ref() else {
                oe -= 1;
                continue;
            };

            if same_vnode(old_start, &new_children[ns]) {
                if let Some(vnode) = old[os].take() {
                    self.patch_vnode(vnode, &mut new_children[ns], queue, remove_only)?;
                }
                os += 1;
                ns += 1;
            } else if same_vnode(old_end, &new_children[ne - 1]) {
                if let Some(vnode) = old[oe - 1].take() {
                    self.patch_vnode(vnode, &mut new_children[ne - 1], queue, remove_only)?;
                }
                oe -= 1;
                ne -= 1;
            } else if same_vnode(old_start, &new_children[ne - 1]) {
                // Moved right.
                let reference = old_end.elm().and_then(|elm| host.next_sibling(elm));
                if let Some(vnode) = old[os].take() {
                    self.patch_vnode(vnode, &mut new_children[ne - 1], queue, remove_only)?;
                }
                if can_move {
                    self.insert_before(parent, new_children[ne - 1].elm(), reference);
                }
                os += 1;
                ne -= 1;
            } else if same_vnode(old_end, &new_children[ns]) {
                // Moved left.
                let reference = old_start.elm();
                if let Some(vnode) = old[oe - 1].take() {
                    self.patch_vnode(vnode, &mut new_children[ns], queue, remove_only)?;
                }
                if can_move {
                    self.insert_before(parent, new_children[ns].elm(), reference);
                }
                oe -= 1;
                ns += 1;
            } else {
                let reference = old_start.elm();
                let map = key_map.get_or_insert_with(|| build_key_map(&old, os, oe));
                let found = match &new_children[ns].key {
                    Some(key) => map.get(key).copied(),
                    None => find_in_old(&new_children[ns], &old, os, oe),
                };
                let candidate = found.filter(|&i| {
                    old[i]
                        .as_ref()
                        .is_some_and(|vnode| same_vnode(vnode, &new_children[ns]))
                });
                match candidate.and_then(|i| old[i].take()) {
                    Some(vnode) => {
                        self.patch_vnode(vnode, &mut new_children[ns], queue, remove_only)?;
                        if can_move {
                            self.insert_before(parent, new_children[ns].elm(), reference);
                        }
                    }
                    None => {
                        self.create_elm(&mut new_children[ns], queue, Some(parent), reference)?;
                    }
                }
                ns += 1;
            }
        }

        if os >= oe {
            let reference = new_children.get(ne).and_then(VNode::elm);
            self.add_vnodes(parent, reference, &mut new_children[ns..ne], queue)?;
        } else if ns >= ne {
            self.remove_vnodes(old.drain(os..oe).flatten());
        }
        Ok(())
    }
}

/// Key to index over `old[start..end]`. The first occurrence of a key wins.
fn build_key_map(old: &[Option<VNode>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (i, slot) in old.iter().enumerate().take(end).skip(start) {
        if let Some(key) = slot.as_ref().and_then(|vnode| vnode.key.clone()) {
            map.entry(key).or_insert(i);
        }
    }
    map
}

fn find_in_old(node: &VNode, old: &[Option<VNode>], start: usize, end: usize) -> Option<usize> {
    (start..end).find(|&i| old[i].as_ref().is_some_and(|vnode| same_vnode(node, vnode)))
}
