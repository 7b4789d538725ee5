//! Dynamic Values
//!
//! The engine operates on a JS-like value graph: primitives plus shared,
//! interior-mutable arrays and objects. Sharing matters here. Two of the
//! three comparison modes are defined in terms of *identity*, so cloning a
//! [`Value`] must hand out another reference to the same container rather
//! than a copy.
//!
//! # Equality
//!
//! - [`Value::same`] is identity: primitives compare by value, containers by
//!   pointer.
//! - `==` is deep structural equality. Object key order is ignored.
//!
//! Both treat `NaN` as equal to itself so that a watch on a `NaN` value does
//! not fire forever.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Largest gap [`Array::set`] fills with `Null` past the end of an array.
pub const MAX_PADDING: usize = 1 << 20;

/// An index too far past the end of an array to pad up to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index {index} is out of range for an array of length {len}")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub len: usize,
}

/// A dynamic value. `Null` doubles as the "absent" value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Array),
    Object(Object),
}

/// Shared handle to a mutable sequence of values.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

/// Shared handle to a mutable, insertion-ordered map of values.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<IndexMap<String, Value>>>);

impl Array {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing vector.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, or `Null` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Store `value` at `index`, padding with `Null` if the array is shorter.
    ///
    /// At most [`MAX_PADDING`] `Null`s are added past the current end.
    pub fn set(&self, index: usize, value: Value) -> Result<(), IndexOutOfRange> {
        let mut items = self.0.borrow_mut();
        let len = items.len();
        if index >= len {
            let out_of_range = IndexOutOfRange { index, len };
            if index - len > MAX_PADDING {
                return Err(out_of_range);
            }
            let new_len = index.checked_add(1).ok_or(out_of_range)?;
            items.try_reserve(new_len - len).map_err(|_| out_of_range)?;
            items.resize(new_len, Value::Null);
        }
        items[index] = value;
        Ok(())
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Snapshot of the current elements (element identities are shared).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    /// Whether both handles point at the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value under `key`, or `Null` when missing.
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn borrow(&self) -> Ref<'_, IndexMap<String, Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, IndexMap<String, Value>> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Value {
    /// Build an array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Array::from_vec(items.into_iter().collect()))
    }

    /// Build an empty object value.
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Property lookup on objects; `Null` for anything else.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key),
            _ => Value::Null,
        }
    }

    /// Index lookup on arrays; `Null` for anything else.
    pub fn at(&self, index: usize) -> Value {
        match self {
            Value::Array(array) => array.get(index),
            _ => Value::Null,
        }
    }

    /// Identity comparison.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// A fully detached structural copy.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Array(array) => {
                Value::array(array.borrow().iter().map(Value::deep_copy).collect::<Vec<_>>())
            }
            Value::Object(object) => {
                let copy = Object::new();
                for (key, value) in object.borrow().iter() {
                    copy.insert(key.clone(), value.deep_copy());
                }
                Value::Object(copy)
            }
            other => other.clone(),
        }
    }

    /// A new container holding the same element identities.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::Array(array) => Value::Array(Array::from_vec(array.to_vec())),
            Value::Object(object) => {
                Value::Object(Object(Rc::new(RefCell::new(object.borrow().clone()))))
            }
            other => other.clone(),
        }
    }

    /// Convert into a `serde_json::Value` (numbers that are not finite become `null`).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(array) => {
                serde_json::Value::Array(array.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(object) => serde_json::Value::Object(
                object
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || *a.borrow() == *b.borrow(),
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(array) => f.debug_list().entries(array.borrow().iter()).finish(),
            Value::Object(object) => f.debug_map().entries(object.borrow().iter()).finish(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.borrow().iter()).finish()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.borrow().iter()).finish()
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.insert(key, Value::from(value));
                }
                Value::Object(object)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(array) => {
                let items = array.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let entries = object.borrow();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}
