//! Attribute bags: structured data that is not always completely available.
//!
//! Every telemetry record decoded from the daemon carries one of these.
//! A key that the daemon did not report is simply absent from the bag,
//! which is different from a reported-but-empty value; readers pick
//! between the failing [`AttrBag::get`] and the tolerant
//! [`AttrBag::get_or`] accordingly.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::telemetry::{Location, Signal};

/// The closed set of value kinds an [`AttrBag`] can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Signal(Signal),
    Location(Location),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::U64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::U64(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Signal> for Value {
    fn from(v: Signal) -> Self {
        Self::Signal(v)
    }
}

impl From<Location> for Value {
    fn from(v: Location) -> Self {
        Self::Location(v)
    }
}

/// Conversion out of a stored [`Value`], used by the typed accessors.
pub trait FromValue: Sized {
    /// Human-readable kind name for the type-mismatch error message.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "signed integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for u64 {
    const EXPECTED: &'static str = "unsigned integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for u32 {
    const EXPECTED: &'static str = "unsigned integer";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::U64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "double";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for Signal {
    const EXPECTED: &'static str = "signal record";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Signal(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FromValue for Location {
    const EXPECTED: &'static str = "location record";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Location(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// An ordered string-keyed map of loosely-typed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrBag {
    entries: BTreeMap<String, Value>,
}

impl AttrBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Whether a value for `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// The keys of all present values, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Typed read of `key`. Fails with [`Error::MissingKey`] when the key is
    /// absent and [`Error::TypeMismatch`] when the stored value has a
    /// different kind.
    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| Error::MissingKey(key.to_owned()))?;
        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            key: key.to_owned(),
            expected: T::EXPECTED,
        })
    }

    /// Typed read of `key`, falling back to `fallback` when the key is
    /// absent or of the wrong kind. Never fails.
    pub fn get_or<T: FromValue>(&self, key: &str, fallback: T) -> T {
        self.entries
            .get(key)
            .and_then(T::from_value)
            .unwrap_or(fallback)
    }
}
