//! Reactive core: values, deps, watchers and the scheduler.
//!
//! ```text
//! Object/Array field ──read──► Dep ◄──subscribes── Watcher ──queued──► Scheduler
//!        │                      ▲                     │                     │
//!        └──────write───────────┘ notify ─────────────┘ update        flush (by id)
//! ```
//!
//! All state lives in a [`Runtime`]. Deps and watchers reference each other
//! through ids stored in the runtime's arenas, never through pointers.

mod array;
mod computed;
mod dep;
mod next_tick;
mod object;
mod observer;
mod runtime;
pub(crate) mod scheduler;
mod value;
mod watcher;

pub use array::{Array, MAX_SET_PADDING};
pub use computed::Computed;
pub use dep::{Dep, DepId};
pub use next_tick::{Defer, Task, TaskQueue};
pub use object::Object;
pub use observer::traverse;
pub use runtime::Runtime;
pub use value::Value;
pub use watcher::{
    ChangePolicy, Getter, HookFn, WatchCallback, WatchOptions, Watcher, WatcherFlags, WatcherId,
};
