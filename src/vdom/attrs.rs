//! Attribute module: keeps host attributes in sync with `VNodeData::attrs`.

use super::hooks::Module;
use super::vnode::VNode;
use crate::host::HostAdapter;

#[derive(Debug, Default, Clone, Copy)]
pub struct AttrsModule;

impl Module for AttrsModule {
    fn create(&self, host: &dyn HostAdapter, vnode: &VNode) {
        let (Some(elm), Some(data)) = (vnode.elm(), &vnode.data) else {
            return;
        };
        if vnode.tag.is_none() && !vnode.is_component() {
            return;
        }
        for (name, value) in &data.attrs {
            host.set_attribute(elm, name, value);
        }
    }

    fn update(&self, host: &dyn HostAdapter, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else { return };
        if vnode.tag.is_none() && !vnode.is_component() {
            return;
        }
        let empty = Default::default();
        let old_attrs = old.data.as_ref().map_or(&empty, |d| &d.attrs);
        let new_attrs = vnode.data.as_ref().map_or(&empty, |d| &d.attrs);

        for (name, value) in new_attrs {
            if old_attrs.get(name) != Some(value) {
                host.set_attribute(elm, name, value);
            }
        }
        for name in old_attrs.keys() {
            if !new_attrs.contains_key(name) {
                host.remove_attribute(elm, name);
            }
        }
    }
}
