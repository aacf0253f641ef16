//! Observer - the reactive state attached to a container.
//!
//! An [`Object`](super::Object) or [`Array`](super::Array) becomes reactive
//! when an observer is attached to it. The observer carries the container's
//! own dep, which is notified on structural changes (keys added or removed,
//! array mutations) and depended on by every read that reaches the container
//! through a reactive field.

use std::collections::HashSet;
use std::rc::Weak;

use super::dep::{Dep, DepId};
use super::runtime::{Runtime, RuntimeInner};
use super::value::Value;

pub(crate) struct Observer {
    dep: Dep,
    runtime: Weak<RuntimeInner>,
}

impl Observer {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            dep: Dep::new(runtime),
            runtime: runtime.downgrade(),
        }
    }

    pub(crate) fn dep_id(&self) -> DepId {
        self.dep.id()
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.runtime)
    }
}

/// Dep of a reactive container value, if any.
pub(crate) fn container_dep(value: &Value) -> Option<DepId> {
    match value {
        Value::Object(object) => object.container_dep(),
        Value::Array(array) => array.container_dep(),
        _ => None,
    }
}

/// Depend on a value read out of a reactive field.
///
/// A container value is depended on as a whole, so structural changes to it
/// re-trigger the reader. Arrays have no per-index deps, so their container
/// elements are depended on too, recursively.
pub(crate) fn depend_child(runtime: &Runtime, value: &Value) {
    if let Some(dep) = container_dep(value) {
        runtime.depend(dep);
    }
    if let Value::Array(array) = value {
        let mut seen = HashSet::new();
        seen.insert(array.addr());
        depend_array(runtime, &array.raw_items(), &mut seen);
    }
}

fn depend_array(runtime: &Runtime, items: &[Value], seen: &mut HashSet<usize>) {
    for item in items {
        if let Some(dep) = container_dep(item) {
            runtime.depend(dep);
        }
        if let Value::Array(array) = item {
            if seen.insert(array.addr()) {
                depend_array(runtime, &array.raw_items(), seen);
            }
        }
    }
}

/// Read every nested field of `value` so the active watcher depends on all
/// of them. Cycle-safe.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<usize>) {
    let Some(addr) = value.container_addr() else {
        return;
    };
    if !seen.insert(addr) {
        return;
    }
    match value {
        Value::Object(object) => {
            for key in object.raw_keys() {
                let child = object.get(&key);
                traverse_inner(&child, seen);
            }
        }
        Value::Array(array) => {
            for item in array.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
