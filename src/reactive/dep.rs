//! Dep - per-field subscriber registry.
//!
//! Deps live in the runtime's arena, keyed by [`DepId`]. A [`Dep`] handle is
//! owned by exactly one reactive field (or one container) and removes its
//! arena entry when dropped. Watchers refer to deps only by id, and deps refer
//! to watchers only by [`WatcherId`], so there are no back-references.

use std::fmt;
use std::rc::Weak;

use super::runtime::{Runtime, RuntimeInner};
use super::watcher::WatcherId;

/// Unique, monotonically increasing dep identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(pub(crate) u64);

impl DepId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Owning handle for one subscriber registry.
pub struct Dep {
    id: DepId,
    runtime: Weak<RuntimeInner>,
}

impl Dep {
    /// Register a new dep in the runtime's arena.
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            id: runtime.register_dep(),
            runtime: runtime.downgrade(),
        }
    }

    pub fn id(&self) -> DepId {
        self.id
    }

    /// Record this dep as a dependency of the currently evaluating watcher.
    pub fn depend(&self) {
        if let Some(runtime) = Runtime::upgrade(&self.runtime) {
            runtime.depend(self.id);
        }
    }

    /// Invalidate every subscriber.
    pub fn notify(&self) {
        if let Some(runtime) = Runtime::upgrade(&self.runtime) {
            runtime.notify(self.id);
        }
    }

    /// Current subscribers, ascending by id.
    pub fn subscribers(&self) -> Vec<WatcherId> {
        Runtime::upgrade(&self.runtime)
            .map(|runtime| runtime.subscribers(self.id))
            .unwrap_or_default()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep").field("id", &self.id).finish()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        if let Some(runtime) = Runtime::upgrade(&self.runtime) {
            runtime.release_dep(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increment() {
        let runtime = Runtime::new();
        let a = Dep::new(&runtime);
        let b = Dep::new(&runtime);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_drop_releases_arena_entry() {
        let runtime = Runtime::new();
        let dep = Dep::new(&runtime);
        assert_eq!(runtime.dep_count(), 1);
        drop(dep);
        assert_eq!(runtime.dep_count(), 0);
    }

    #[test]
    fn test_depend_without_active_watcher_is_noop() {
        let runtime = Runtime::new();
        let dep = Dep::new(&runtime);
        dep.depend();
        assert!(dep.subscribers().is_empty());
    }
}
