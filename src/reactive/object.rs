//! Object - keyed reactive container.
//!
//! Every field of an observed object owns a [`Dep`]. Reading a field inside a
//! watcher subscribes the watcher to that field; assigning a different value
//! notifies it. Adding or removing keys notifies the object's own container
//! dep instead, which is what `keys`, `len` and reads of absent keys depend
//! on.
//!
//! An object created with [`Object::new`] is plain: reads and writes work but
//! track nothing. It becomes reactive when assigned into a reactive container
//! or passed to [`Runtime::observe`](crate::Runtime::observe).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::dep::{Dep, DepId};
use super::observer::{depend_child, Observer};
use super::runtime::Runtime;
use super::value::Value;

struct Field {
    value: Value,
    dep: Option<Dep>,
    /// Assigned values are stored as-is, never observed.
    shallow: bool,
}

struct ObjectInner {
    fields: RefCell<BTreeMap<Rc<str>, Field>>,
    observer: RefCell<Option<Observer>>,
}

/// Shared handle to a keyed container. Clones alias the same fields.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                fields: RefCell::new(BTreeMap::new()),
                observer: RefCell::new(None),
            }),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn is_reactive(&self) -> bool {
        self.inner.observer.borrow().is_some()
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.inner.observer.borrow().as_ref().and_then(Observer::runtime)
    }

    /// The container dep, notified when keys are added or removed.
    pub fn container_dep(&self) -> Option<DepId> {
        self.inner.observer.borrow().as_ref().map(Observer::dep_id)
    }

    /// The dep of one field.
    pub fn dep_of(&self, key: &str) -> Option<DepId> {
        self.inner
            .fields
            .borrow()
            .get(key)
            .and_then(|field| field.dep.as_ref().map(Dep::id))
    }

    /// Make this object and every non-shallow value reachable from it
    /// reactive in `runtime`. No-op if already observed.
    pub(crate) fn attach(&self, runtime: &Runtime) {
        if self.is_reactive() {
            return;
        }
        *self.inner.observer.borrow_mut() = Some(Observer::new(runtime));

        let children: Vec<Value> = {
            let mut fields = self.inner.fields.borrow_mut();
            fields
                .values_mut()
                .filter_map(|field| {
                    if field.dep.is_none() {
                        field.dep = Some(Dep::new(runtime));
                    }
                    (!field.shallow && field.value.is_container()).then(|| field.value.clone())
                })
                .collect()
        };
        for child in &children {
            runtime.observe(child);
        }
    }

    fn track_container(&self) {
        if let (Some(runtime), Some(dep)) = (self.runtime(), self.container_dep()) {
            runtime.depend(dep);
        }
    }

    fn notify_container(&self) {
        if let (Some(runtime), Some(dep)) = (self.runtime(), self.container_dep()) {
            runtime.notify(dep);
        }
    }

    /// Read a field. Absent keys read as `Null` and depend on the container.
    pub fn get(&self, key: &str) -> Value {
        let found = self
            .inner
            .fields
            .borrow()
            .get(key)
            .map(|field| (field.value.clone(), field.dep.as_ref().map(Dep::id)));

        let Some(runtime) = self.runtime() else {
            return found.map(|(value, _)| value).unwrap_or_default();
        };
        match found {
            Some((value, dep)) => {
                if runtime.is_tracking() {
                    if let Some(dep) = dep {
                        runtime.depend(dep);
                    }
                    depend_child(&runtime, &value);
                }
                value
            }
            None => {
                self.track_container();
                Value::Null
            }
        }
    }

    /// Assign a field. Writing the same value is a no-op; a new key is
    /// defined and announced on the container dep.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let existing = self
            .inner
            .fields
            .borrow()
            .get(key)
            .map(|field| (field.value.same(&value), field.shallow));

        match existing {
            Some((true, _)) => {}
            Some((false, shallow)) => {
                let runtime = self.runtime();
                if let (false, Some(runtime)) = (shallow, &runtime) {
                    runtime.observe(&value);
                }
                let (old, dep) = {
                    let mut fields = self.inner.fields.borrow_mut();
                    match fields.get_mut(key) {
                        Some(field) => (
                            Some(std::mem::replace(&mut field.value, value)),
                            field.dep.as_ref().map(Dep::id),
                        ),
                        None => (None, None),
                    }
                };
                drop(old);
                if let (Some(runtime), Some(dep)) = (runtime, dep) {
                    runtime.notify(dep);
                }
            }
            None => self.define(key, value, false),
        }
    }

    /// Define or replace a field whose values are never made reactive.
    /// The field itself is still tracked.
    pub fn define_shallow(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !self.inner.fields.borrow().contains_key(key) {
            self.define(key, value, true);
            return;
        }
        let (old, changed, dep) = {
            let mut fields = self.inner.fields.borrow_mut();
            let Some(field) = fields.get_mut(key) else { return };
            field.shallow = true;
            let changed = !field.value.same(&value);
            let old = std::mem::replace(&mut field.value, value);
            (old, changed, field.dep.as_ref().map(Dep::id))
        };
        drop(old);
        if let (true, Some(runtime), Some(dep)) = (changed, self.runtime(), dep) {
            runtime.notify(dep);
        }
    }

    fn define(&self, key: &str, value: Value, shallow: bool) {
        let runtime = self.runtime();
        if let (false, Some(runtime)) = (shallow, &runtime) {
            runtime.observe(&value);
        }
        let dep = runtime.as_ref().map(Dep::new);
        self.inner
            .fields
            .borrow_mut()
            .insert(key.into(), Field { value, dep, shallow });
        self.notify_container();
    }

    /// Remove a field, notifying its readers and the container dep.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let field = self.inner.fields.borrow_mut().remove(key)?;
        if let (Some(runtime), Some(dep)) = (self.runtime(), &field.dep) {
            runtime.notify(dep.id());
        }
        self.notify_container();
        Some(field.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.track_container();
        self.inner.fields.borrow().contains_key(key)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.track_container();
        self.raw_keys()
    }

    pub fn len(&self) -> usize {
        self.track_container();
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys without tracking.
    pub(crate) fn raw_keys(&self) -> Vec<Rc<str>> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Entries without tracking.
    pub fn raw_entries(&self) -> Vec<(Rc<str>, Value)> {
        self.inner
            .fields
            .borrow()
            .iter()
            .map(|(key, field)| (key.clone(), field.value.clone()))
            .collect()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            object.set(key.as_ref(), value);
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.raw_keys())
            .field("reactive", &self.is_reactive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{WatchOptions, Watcher};
    use std::cell::Cell;

    fn counting_watcher(rt: &Runtime, getter: impl Fn() -> Value + 'static) -> (Watcher, Rc<Cell<u32>>) {
        let hits = Rc::new(Cell::new(0));
        let hits_cb = hits.clone();
        let watcher = rt
            .watch(
                move || Ok(getter()),
                move |_, _| {
                    hits_cb.set(hits_cb.get() + 1);
                    Ok(())
                },
                WatchOptions::new().sync(),
            )
            .unwrap();
        (watcher, hits)
    }

    #[test]
    fn test_plain_object_tracks_nothing() {
        let object = Object::new();
        object.set("a", 1);
        assert_eq!(object.get("a"), Value::from(1));
        assert!(object.dep_of("a").is_none());
        assert!(!object.is_reactive());
    }

    #[test]
    fn test_same_value_write_does_not_notify() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("a", 1);
        let s = state.clone();
        let (_w, hits) = counting_watcher(&rt, move || s.get("a"));

        state.set("a", 1);
        assert_eq!(hits.get(), 0);
        state.set("a", 2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_new_key_notifies_absent_read() {
        let rt = Runtime::new();
        let state = rt.object();
        let s = state.clone();
        let (_w, hits) = counting_watcher(&rt, move || s.get("later"));

        state.set("later", "here");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_delete_notifies_readers() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("gone", 1);
        let s = state.clone();
        let (_w, hits) = counting_watcher(&rt, move || s.get("gone"));

        assert_eq!(state.delete("gone"), Some(Value::from(1)));
        assert_eq!(hits.get(), 1);
        assert!(!state.contains_key("gone"));
        assert_eq!(state.delete("gone"), None);
    }

    #[test]
    fn test_assigned_object_becomes_reactive() {
        let rt = Runtime::new();
        let state = rt.object();
        let child = Object::new();
        child.set("x", 1);
        state.set("child", child.clone());
        assert!(child.is_reactive());
        assert!(child.dep_of("x").is_some());
    }

    #[test]
    fn test_without_observing_leaves_value_plain() {
        let rt = Runtime::new();
        let state = rt.object();
        let child = Object::new();
        rt.without_observing(|| state.set("child", child.clone()));
        assert!(!child.is_reactive());
    }

    #[test]
    fn test_shallow_field_keeps_value_plain() {
        let rt = Runtime::new();
        let state = rt.object();
        let child = Object::new();
        state.define_shallow("child", child.clone());
        assert!(!child.is_reactive());
        assert!(state.dep_of("child").is_some());

        let s = state.clone();
        let (_w, hits) = counting_watcher(&rt, move || s.get("child"));
        state.define_shallow("child", Object::new());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_keys_track_structure() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("b", 1);
        state.set("a", 2);
        let s = state.clone();
        let (_w, hits) = counting_watcher(&rt, move || Value::from(s.len()));

        assert_eq!(state.raw_keys(), vec![Rc::from("a"), Rc::from("b")]);
        state.set("c", 3);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dropping_object_releases_deps() {
        let rt = Runtime::new();
        {
            let state = rt.object();
            state.set("a", 1);
            state.set("b", 2);
            assert_eq!(rt.dep_count(), 3);
        }
        assert_eq!(rt.dep_count(), 0);
    }

    #[test]
    fn test_from_iter() {
        let object: Object = [("x", 1), ("y", 2)].into_iter().collect();
        assert_eq!(object.raw_entries().len(), 2);
        assert_eq!(object.get("y"), Value::from(2));
    }

    #[test]
    fn test_sync_watcher_sees_latest_value() {
        let rt = Runtime::new();
        let state = rt.object();
        state.set("n", 0);
        let s = state.clone();
        let watcher = Watcher::new(&rt, Rc::new(move || Ok(s.get("n"))), None, WatchOptions::new().sync()).unwrap();
        state.set("n", 1);
        assert_eq!(watcher.value(), Value::from(1));
    }
}
