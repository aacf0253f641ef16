//! Value - the dynamic payload stored in reactive containers.
//!
//! A [`Value`] is either a primitive or a handle to a structural container
//! ([`Object`] or [`Array`]). Containers are reference types: cloning a
//! `Value::Object` clones the handle, not the fields.
//!
//! # Equality
//!
//! `Value` equality is "same value" equality:
//! - primitives compare by value, and `NaN` equals `NaN`
//! - containers compare by identity
//!
//! This is what writes use to decide whether anything changed. For structural
//! comparison use [`Value::deep_eq`].

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::array::Array;
use super::object::Object;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// "Same value" comparison used for write change detection.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Structural comparison. Reads are untracked.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut seen = HashSet::new();
        deep_eq_inner(self, other, &mut seen)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Truthiness for conditional rendering.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// Address of the container, used as identity in seen-sets.
    pub(crate) fn container_addr(&self) -> Option<usize> {
        match self {
            Value::Object(o) => Some(o.addr()),
            Value::Array(a) => Some(a.addr()),
            _ => None,
        }
    }
}

fn deep_eq_inner(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) || !seen.insert((x.addr(), y.addr())) {
                return true;
            }
            let xs = x.raw_entries();
            let ys = y.raw_entries();
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && deep_eq_inner(va, vb, seen))
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) || !seen.insert((x.addr(), y.addr())) {
                return true;
            }
            let xs = x.raw_items();
            let ys = y.raw_items();
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(va, vb)| deep_eq_inner(va, vb, seen))
        }
        _ => a.same(b),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
        }
    }
}

/// Text form used when a value is rendered as a text node.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Object(_) => f.write_str("{..}"),
            Value::Array(a) => {
                let items = a.raw_items();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        Value::Array(_) => f.write_str("[..]")?,
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(value: Rc<str>) -> Self {
        Value::Str(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(Array::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_is_same_as_itself() {
        let a = Value::Number(f64::NAN);
        let b = Value::Number(f64::NAN);
        assert!(a.same(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_containers_compare_by_identity() {
        let a = Object::new();
        a.set("x", 1);
        let b = Object::new();
        b.set("x", 1);

        let va = Value::Object(a.clone());
        let vb = Value::Object(b);
        assert!(!va.same(&vb));
        assert!(va.same(&Value::Object(a)));
        assert!(va.deep_eq(&vb));
    }

    #[test]
    fn test_deep_eq_handles_cycles() {
        let a = Object::new();
        a.set("self", a.clone());
        let b = Object::new();
        b.set("self", b.clone());
        assert!(Value::from(a).deep_eq(&Value::from(b)));
    }

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.to_string(), "");
        let arr = Array::from(vec![Value::from(1), Value::from("a")]);
        assert_eq!(Value::from(arr).to_string(), "1,a");
    }

    #[test]
    fn test_display_of_self_containing_containers() {
        let arr = Array::from(vec![Value::from(1)]);
        arr.push(arr.clone());
        assert_eq!(Value::from(arr).to_string(), "1,[..]");

        let obj = Object::new();
        obj.set("self", obj.clone());
        assert_eq!(Value::from(obj).to_string(), "{..}");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(Object::new()).is_truthy());
    }
}
