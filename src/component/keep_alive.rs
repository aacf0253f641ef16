//! KeepAlive - caching policy for component instances.
//!
//! A component node wrapped by a [`KeepAlive`] is deactivated instead of
//! destroyed when removed, and its instance (with its rendered subtree) is
//! reused the next time a node with the same cache key is created. The cache
//! is least-recently-used: past `max` entries the oldest instance is
//! destroyed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::instance::Instance;
use crate::vdom::{VNode, VNodeFlags};

struct KeepAliveInner {
    /// Oldest first.
    cache: RefCell<Vec<(Rc<str>, Instance)>>,
    max: Cell<Option<usize>>,
    include: RefCell<Vec<Rc<str>>>,
    exclude: RefCell<Vec<Rc<str>>>,
}

/// Shared instance cache. Clones share the cache.
#[derive(Clone)]
pub struct KeepAlive {
    inner: Rc<KeepAliveInner>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(KeepAliveInner {
                cache: RefCell::new(Vec::new()),
                max: Cell::new(None),
                include: RefCell::new(Vec::new()),
                exclude: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Keep at most `max` instances.
    pub fn max(self, max: usize) -> Self {
        self.inner.max.set(Some(max));
        self
    }

    /// Only cache components with these names.
    pub fn include<S: AsRef<str>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.inner
            .include
            .borrow_mut()
            .extend(names.into_iter().map(|n| Rc::from(n.as_ref())));
        self
    }

    /// Never cache components with these names.
    pub fn exclude<S: AsRef<str>>(self, names: impl IntoIterator<Item = S>) -> Self {
        self.inner
            .exclude
            .borrow_mut()
            .extend(names.into_iter().map(|n| Rc::from(n.as_ref())));
        self
    }

    fn matches(&self, name: &str) -> bool {
        let include = self.inner.include.borrow();
        if !include.is_empty() && !include.iter().any(|n| &**n == name) {
            return false;
        }
        !self.inner.exclude.borrow().iter().any(|n| &**n == name)
    }

    /// Mark a component node as cached. Other nodes, and components
    /// filtered out by `include`/`exclude`, pass through unchanged.
    pub fn wrap(&self, mut vnode: VNode) -> VNode {
        let Some(component) = vnode.component.as_mut() else {
            return vnode;
        };
        let name = component.def.name();
        if !self.matches(&name) {
            return vnode;
        }
        let key: Rc<str> = match &vnode.key {
            Some(key) => format!("{name}::{key}").into(),
            None => format!("{name}@{:p}", Rc::as_ptr(&component.def)).into(),
        };
        component.keep_alive = Some(self.clone());
        component.cache_key = Some(key.clone());
        vnode.flags |= VNodeFlags::KEEP_ALIVE;
        vnode.instance = self.touch(&key);
        vnode
    }

    /// Move a live entry to the most-recent end and return its instance.
    fn touch(&self, key: &str) -> Option<Instance> {
        let mut cache = self.inner.cache.borrow_mut();
        cache.retain(|(_, instance)| !instance.is_destroyed());
        let index = cache.iter().position(|(k, _)| &**k == key)?;
        let entry = cache.remove(index);
        let instance = entry.1.clone();
        cache.push(entry);
        Some(instance)
    }

    pub(crate) fn store(&self, key: Rc<str>, instance: Instance) {
        let pruned = {
            let mut cache = self.inner.cache.borrow_mut();
            cache.retain(|(k, _)| *k != key);
            cache.push((key, instance));
            match self.inner.max.get() {
                Some(max) if cache.len() > max => {
                    let excess = cache.len() - max;
                    cache.drain(..excess).collect()
                }
                _ => Vec::new(),
            }
        };
        for (key, instance) in pruned {
            tracing::debug!(key = %key, "pruning cached component");
            instance.destroy();
        }
    }

    /// Destroy the cached instances that `owner` rendered. Runs when the
    /// owner itself is destroyed.
    pub(crate) fn release(&self, owner: &Instance) {
        let released: Vec<(Rc<str>, Instance)> = {
            let mut cache = self.inner.cache.borrow_mut();
            let (released, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *cache)
                .into_iter()
                .partition(|(_, instance)| instance.parent().is_some_and(|parent| parent.ptr_eq(owner)));
            *cache = kept;
            released
        };
        for (key, instance) in released {
            tracing::debug!(key = %key, "releasing cached component");
            instance.destroy();
        }
    }

    pub fn ptr_eq(&self, other: &KeepAlive) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Destroy every cached instance. Call once the subtree that uses this
    /// cache is gone for good.
    pub fn clear(&self) {
        let cached = std::mem::take(&mut *self.inner.cache.borrow_mut());
        for (_, instance) in cached {
            instance.destroy();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cache.borrow().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.cache.borrow().iter().any(|(k, _)| &**k == key)
    }

    /// Cache keys, least recently used first.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.cache.borrow().iter().map(|(k, _)| k.clone()).collect()
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("keys", &self.keys())
            .field("max", &self.inner.max.get())
            .finish()
    }
}
