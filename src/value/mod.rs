//! Provides a dynamic value type abstracting over the data templates render.
//!
//! Values enter the engine through `serde` ([`Value::from_serialize`]) or the
//! [`From`] implementations, and leave it stringified into the output buffer.
//! Lookups never fail: a missing variable, a missing attribute or an
//! intermediate `null` all resolve to [`Value::NULL`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

mod object;
pub(crate) mod ops;
mod serialize;

pub use self::object::{LazyObject, LazyPropertyProvider, Object};

/// An insertion ordered map of values.
///
/// Mapping iteration in `for` loops follows insertion order, which is why
/// this is an [`IndexMap`] rather than a hash or btree map.
pub type ValueMap = IndexMap<String, Value>;

/// Represents a dynamically typed value in the template engine.
#[derive(Clone, Default)]
pub struct Value(pub(crate) ValueRepr);

#[derive(Clone, Default)]
pub(crate) enum ValueRepr {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Dynamic(Arc<dyn Object>),
}

/// Describes the kind of a [`Value`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// The null value, also used for everything absent.
    Null,
    /// A boolean.
    Bool,
    /// An integer or float.
    Number,
    /// A string.
    String,
    /// An ordered sequence.
    Seq,
    /// A key/value mapping with string keys.
    Map,
    /// A dynamic object, possibly with lazy properties.
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Object => "object",
        })
    }
}

/// Formats a float the way the template dialect stringifies numbers: whole
/// values print without a fractional part.
pub(crate) fn fmt_f64(f: &mut fmt::Formatter<'_>, val: f64) -> fmt::Result {
    if val.is_nan() {
        f.write_str("NaN")
    } else if val.is_infinite() {
        write!(f, "{}Infinity", if val.is_sign_negative() { "-" } else { "" })
    } else if val.fract() == 0.0 && val.abs() < 9.007_199_254_740_992e15 {
        write!(f, "{}", val as i64)
    } else {
        write!(f, "{val}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Null => Ok(()),
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::I64(val) => val.fmt(f),
            ValueRepr::F64(val) => fmt_f64(f, val),
            ValueRepr::String(ref val) => f.write_str(val),
            ValueRepr::Seq(ref values) => {
                for (idx, val) in values.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(","));
                    }
                    ok!(val.fmt(f));
                }
                Ok(())
            }
            ValueRepr::Map(ref map) => {
                ok!(f.write_str("{"));
                for (idx, (key, val)) in map.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write!(f, "{key}: {val}"));
                }
                f.write_str("}")
            }
            // dynamic objects have no meaningful string form
            ValueRepr::Dynamic(_) => Ok(()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            ValueRepr::Null => f.write_str("null"),
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::I64(val) => val.fmt(f),
            ValueRepr::F64(val) => fmt_f64(f, val),
            ValueRepr::String(ref val) => val.fmt(f),
            ValueRepr::Seq(ref values) => f.debug_list().entries(values.iter()).finish(),
            ValueRepr::Map(ref map) => f.debug_map().entries(map.iter()).finish(),
            ValueRepr::Dynamic(ref obj) => fmt::Debug::fmt(obj, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (ValueRepr::Null, ValueRepr::Null) => true,
            (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
            (ValueRepr::I64(a), ValueRepr::I64(b)) => a == b,
            (ValueRepr::F64(a), ValueRepr::F64(b)) => a == b,
            (ValueRepr::I64(a), ValueRepr::F64(b)) | (ValueRepr::F64(b), ValueRepr::I64(a)) => {
                *a as f64 == *b
            }
            (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a == b,
            (ValueRepr::Map(a), ValueRepr::Map(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Value {
    /// The null value.
    pub const NULL: Value = Value(ValueRepr::Null);

    /// Creates a value from something that can be serialized.
    ///
    /// This is how render contexts enter the engine.  Data that cannot be
    /// represented (for instance a map with a failing serializer) becomes
    /// [`Value::NULL`] rather than erroring, mirroring how lookups of absent
    /// data behave.
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Value {
        serialize::to_value(value)
    }

    /// Creates a value wrapping a dynamic [`Object`].
    pub fn from_object<T: Object + 'static>(object: T) -> Value {
        Value(ValueRepr::Dynamic(Arc::new(object)))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Null => ValueKind::Null,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
            ValueRepr::Dynamic(_) => ValueKind::Object,
        }
    }

    /// Is this value null?
    pub fn is_null(&self) -> bool {
        matches!(self.0, ValueRepr::Null)
    }

    /// Returns the truthiness of the value.
    ///
    /// This follows the source dialect: empty strings, zero and `NaN` are
    /// false; sequences and mappings are true even when empty.
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Null => false,
            ValueRepr::Bool(val) => val,
            ValueRepr::I64(val) => val != 0,
            ValueRepr::F64(val) => val != 0.0 && !val.is_nan(),
            ValueRepr::String(ref val) => !val.is_empty(),
            ValueRepr::Seq(_) | ValueRepr::Map(_) | ValueRepr::Dynamic(_) => true,
        }
    }

    /// If the value is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match self.0 {
            ValueRepr::String(ref val) => Some(val),
            _ => None,
        }
    }

    /// Returns the length of sequences, mappings and strings.
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref val) => Some(val.chars().count()),
            ValueRepr::Seq(ref values) => Some(values.len()),
            ValueRepr::Map(ref map) => Some(map.len()),
            _ => None,
        }
    }

    /// Returns `true` if the length is zero.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// Looks up an attribute by name.
    ///
    /// Missing attributes resolve to null.  Dynamic objects are consulted
    /// through their [`Object::get_attr`] hook, which is where lazy
    /// properties resolve.  Sequences and strings expose `length`.
    pub fn get_attr(&self, name: &str) -> Value {
        match self.0 {
            ValueRepr::Map(ref map) => map.get(name).cloned().unwrap_or(Value::NULL),
            ValueRepr::Dynamic(ref obj) => obj.get_attr(name).unwrap_or(Value::NULL),
            ValueRepr::Seq(_) | ValueRepr::String(_) if name == "length" => {
                Value::from(self.len().unwrap_or(0) as i64)
            }
            _ => Value::NULL,
        }
    }

    /// Looks up an item by a key value, as produced by subscript notation.
    ///
    /// Numbers index sequences and strings by position and mappings by their
    /// stringified form; every other key behaves like an attribute lookup.
    pub fn get_item(&self, key: &Value) -> Value {
        match self.0 {
            ValueRepr::Seq(ref values) => match key.as_index() {
                Some(idx) => values.get(idx).cloned().unwrap_or(Value::NULL),
                None => self.get_attr(&key.as_key_string()),
            },
            ValueRepr::String(ref val) => match key.as_index() {
                Some(idx) => val
                    .chars()
                    .nth(idx)
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or(Value::NULL),
                None => self.get_attr(&key.as_key_string()),
            },
            _ => self.get_attr(&key.as_key_string()),
        }
    }

    /// Interprets the value as a non-negative sequence index.
    fn as_index(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::I64(val) if val >= 0 => Some(val as usize),
            ValueRepr::F64(val) if val >= 0.0 && val.fract() == 0.0 => Some(val as usize),
            ValueRepr::String(ref val) => val.parse::<usize>().ok(),
            _ => None,
        }
    }

    /// Returns the string form used when the value keys into a mapping.
    pub(crate) fn as_key_string(&self) -> String {
        match self.0 {
            ValueRepr::Null => "null".into(),
            _ => self.to_string(),
        }
    }

    /// Returns the items iterated by a `for` loop over this value.
    ///
    /// Sequences yield their elements, mappings and dynamic objects yield
    /// their keys in enumeration order, everything else iterates as empty.
    pub(crate) fn iter_items(&self) -> Vec<Value> {
        match self.0 {
            ValueRepr::Seq(ref values) => values.as_ref().clone(),
            ValueRepr::Map(ref map) => map.keys().map(|key| Value::from(key.as_str())).collect(),
            ValueRepr::Dynamic(ref obj) => {
                obj.fields().into_iter().map(Value::from).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::NULL
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value(ValueRepr::Bool(val))
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value(ValueRepr::I64(val))
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value(ValueRepr::I64(val as i64))
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value(ValueRepr::I64(val as i64))
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value(ValueRepr::F64(val))
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value(ValueRepr::String(val.into()))
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value(ValueRepr::String(val.into()))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        Value(ValueRepr::Seq(Arc::new(
            val.into_iter().map(Into::into).collect(),
        )))
    }
}

impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        Value(ValueRepr::Map(Arc::new(val)))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value::NULL,
        }
    }
}
