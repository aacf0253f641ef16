//! Virtual tree and reconciler.
//!
//! - [`VNode`] / [`h`] - tree description for one render pass
//! - [`Renderer`] - creates and patches host trees through a
//!   [`HostAdapter`](crate::host::HostAdapter)
//! - [`Module`] / [`VNodeHooks`] - platform and per-node behavior hooks

mod attrs;
mod children;
mod hooks;
mod patch;
mod vnode;

pub use attrs::AttrsModule;
pub use hooks::{Module, NodeHook, RemoveHandle, RemoveHook, UpdateHook, VNodeHooks};
pub use patch::{PatchOptions, Renderer};
pub use vnode::{h, same_vnode, ComponentVNode, Key, VNode, VNodeData, VNodeFlags};

pub(crate) use patch::run_insert_queue;
