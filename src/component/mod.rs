//! Component layer.
//!
//! - [`ComponentDef`] - static description: props, data, computed, watchers,
//!   hooks, render function
//! - [`Instance`] - a live component driven by its render watcher
//! - [`KeepAlive`] - instance cache that suspends instead of destroying
//! - [`AsyncComponent`] - definition resolved after first render

mod async_component;
mod def;
mod instance;
mod keep_alive;

pub use async_component::AsyncComponent;
pub use def::{
    ComponentDef, ComputedFn, DataFn, ErrorCapturedFn, Hook, HookFn, LifecycleState, Listener, PropDef, RenderFn,
    Validator, WatchDef, WatchHandler, WatchSource,
};
pub use instance::Instance;
pub use keep_alive::KeepAlive;
