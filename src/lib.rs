//! # spark-ui-core
//!
//! Reactive rendering core for UI frameworks.
//!
//! Mutable application state is turned into incremental updates of a host
//! tree. Reads of reactive fields are tracked per field, so a change re-runs
//! only the computations that actually read it, and those re-runs are batched
//! into one ordered flush.
//!
//! ## Architecture
//!
//! ```text
//! Object/Array field ─► Dep ◄─ Watcher ─► Scheduler (batched, by id)
//!                                 │
//!                        render watcher of an Instance
//!                                 │
//!                      render() ─► VNode tree ─► Renderer::patch ─► HostAdapter
//! ```
//!
//! There is no global state: every dep, watcher and queue lives in a
//! [`Runtime`], and two runtimes never observe each other.
//!
//! ## Modules
//!
//! - [`reactive`] - values, deps, watchers, computed values, scheduler
//! - [`vdom`] - virtual tree nodes and the reconciler
//! - [`component`] - component definitions, instances and lifecycle
//! - [`host`] - host adapter trait and an in-memory reference host
//! - [`config`] - per-runtime configuration
//! - [`error`] - errors and warnings
//!
//! ## Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use spark_ui_core::{h, ComponentDef, MemoryHost, Object, Renderer, Runtime};
//!
//! let runtime = Runtime::new();
//! let host = Rc::new(MemoryHost::new());
//! let renderer = Renderer::new(&runtime, host.clone());
//!
//! let counter = ComponentDef::new("Counter")
//!     .data(|_| Object::from_iter([("count", 0)]))
//!     .render(|vm| Ok(h("span").text_content(vm.get("count").to_string())))
//!     .build();
//!
//! let vm = renderer.mount_component(&counter, &[], host.container())?;
//! vm.set("count", 1);
//! runtime.tick(); // one batched re-render
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod host;
pub mod reactive;
pub mod vdom;

pub use component::{AsyncComponent, ComponentDef, Hook, Instance, KeepAlive, LifecycleState, PropDef, WatchDef};
pub use config::Config;
pub use error::{Error, Result, Warning};
pub use host::{HostAdapter, HostNode, HostOp, MemoryHost, OpCounts};
pub use reactive::{
    traverse, Array, ChangePolicy, Computed, Defer, Object, Runtime, TaskQueue, Value, WatchOptions, Watcher,
    WatcherId,
};
pub use vdom::{h, same_vnode, Key, Module, PatchOptions, Renderer, VNode};
