//! Array - ordered reactive container.
//!
//! Arrays have a single dep for the whole container. Every read through the
//! handle depends on it and every mutator notifies it, whether or not the
//! contents actually changed. Inserted elements are observed.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::dep::DepId;
use super::observer::{depend_child, Observer};
use super::runtime::Runtime;
use super::value::Value;

/// Most `Null` items [`Array::set`] will insert to reach an index.
pub const MAX_SET_PADDING: usize = 1 << 16;

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Observer>>,
}

/// Shared handle to an ordered container. Clones alias the same items.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
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

    pub fn container_dep(&self) -> Option<DepId> {
        self.inner.observer.borrow().as_ref().map(Observer::dep_id)
    }

    pub(crate) fn attach(&self, runtime: &Runtime) {
        if self.is_reactive() {
            return;
        }
        *self.inner.observer.borrow_mut() = Some(Observer::new(runtime));
        for item in self.raw_items() {
            runtime.observe(&item);
        }
    }

    fn track(&self) {
        if let (Some(runtime), Some(dep)) = (self.runtime(), self.container_dep()) {
            runtime.depend(dep);
        }
    }

    fn notify(&self) {
        if let (Some(runtime), Some(dep)) = (self.runtime(), self.container_dep()) {
            runtime.notify(dep);
        }
    }

    fn observe_all(&self, items: &[Value]) {
        if let Some(runtime) = self.runtime() {
            for item in items {
                runtime.observe(item);
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, index: usize) -> Value {
        self.track();
        let item = self.inner.items.borrow().get(index).cloned().unwrap_or_default();
        if let Some(runtime) = self.runtime().filter(Runtime::is_tracking) {
            depend_child(&runtime, &item);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the items, tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.raw_items()
    }

    /// Snapshot of the items without tracking.
    pub fn raw_items(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    // =========================================================================
    // Mutators
    // =========================================================================

    pub fn push(&self, value: impl Into<Value>) {
        let value = value.into();
        self.observe_all(std::slice::from_ref(&value));
        self.inner.items.borrow_mut().push(value);
        self.notify();
    }

    pub fn pop(&self) -> Option<Value> {
        let popped = self.inner.items.borrow_mut().pop();
        self.notify();
        popped
    }

    pub fn shift(&self) -> Option<Value> {
        let shifted = {
            let mut items = self.inner.items.borrow_mut();
            (!items.is_empty()).then(|| items.remove(0))
        };
        self.notify();
        shifted
    }

    pub fn unshift(&self, value: impl Into<Value>) {
        let value = value.into();
        self.observe_all(std::slice::from_ref(&value));
        self.inner.items.borrow_mut().insert(0, value);
        self.notify();
    }

    /// Remove `delete_count` items at `start` and insert `insert` in their
    /// place. Out-of-range arguments are clamped. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, insert: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let insert: Vec<Value> = insert.into_iter().collect();
        self.observe_all(&insert);
        let removed: Vec<Value> = {
            let mut items = self.inner.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        };
        self.notify();
        removed
    }

    /// Replace the item at `index`, padding with `Null` past the end.
    ///
    /// A write that would need more than [`MAX_SET_PADDING`] padding items is
    /// dropped with a warning and returns `false`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> bool {
        let len = self.inner.items.borrow().len();
        if index - len.min(index) > MAX_SET_PADDING {
            tracing::warn!(index, len, "array write too far past the end, ignored");
            return false;
        }
        if index >= len {
            let mut padding = vec![Value::Null; index - len];
            padding.push(value.into());
            self.splice(len, 0, padding);
        } else {
            self.splice(index, 1, [value.into()]);
        }
        true
    }

    /// Stable sort. The comparator may read the array.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut items = std::mem::take(&mut *self.inner.items.borrow_mut());
        items.sort_by(|a, b| compare(a, b));
        *self.inner.items.borrow_mut() = items;
        self.notify();
    }

    pub fn reverse(&self) {
        self.inner.items.borrow_mut().reverse();
        self.notify();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
            }),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("len", &self.inner.items.borrow().len())
            .field("reactive", &self.is_reactive())
            .finish()
    }
}
