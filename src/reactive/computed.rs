//! Computed - cached derived value.
//!
//! A computed value is a lazy [`Watcher`]: invalidation only marks it dirty,
//! and the getter re-runs on the next read. Reading a computed value inside
//! another watcher forwards the computed's deps to the reader, so the reader
//! is invalidated by the same writes that invalidate the computed.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::value::Value;
use super::watcher::{Getter, WatchOptions, Watcher};
use crate::error::Result;

/// Handle to a derived value. Clones share the cache.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
    runtime: Runtime,
}

impl Computed {
    pub(crate) fn new(runtime: &Runtime, getter: Getter, label: Option<Rc<str>>) -> Self {
        let mut options = WatchOptions::new().lazy();
        options.label = label;
        let watcher = Watcher::create(runtime, getter, None, options);
        Self {
            watcher,
            runtime: runtime.clone(),
        }
    }

    /// Current value, recomputed first if any dependency changed.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if self.runtime.is_tracking() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop tracking. Later reads return the last cached value.
    pub fn dispose(&self) {
        self.watcher.teardown();
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("label", &self.watcher.label())
            .field("dirty", &self.watcher.is_dirty())
            .finish()
    }
}
