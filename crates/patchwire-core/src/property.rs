//! Per-unit persisted state.
//!
//! A [`PropertyBag`] is an ordered map of string keys to loosely typed values.
//! The persistence collaborator stores and loads it without knowing what it
//! means; the unit reads it back into a fresh snapshot at load time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Ordered list.
    List(Vec<PropertyValue>),
    /// Nested bag.
    Bag(PropertyBag),
}

impl PropertyValue {
    /// Numeric value, accepting integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// List value.
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Nested bag.
    pub fn as_bag(&self) -> Option<&PropertyBag> {
        match self {
            PropertyValue::Bag(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(f64::from(v))
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(v: Vec<PropertyValue>) -> Self {
        PropertyValue::List(v)
    }
}

impl From<PropertyBag> for PropertyValue {
    fn from(v: PropertyBag) -> Self {
        PropertyValue::Bag(v)
    }
}

/// Opaque structured state of one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    /// Empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bag has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts or replaces a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric value if present and numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropertyValue::as_f64)
    }

    /// Numeric value that must be present.
    pub fn require_f64(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| Error::invalid_state(key, "expected a number")),
            None => Err(Error::invalid_state(key, "missing")),
        }
    }

    /// List that must be present.
    pub fn require_list(&self, key: &str) -> Result<&[PropertyValue]> {
        match self.get(key) {
            Some(value) => value
                .as_list()
                .ok_or_else(|| Error::invalid_state(key, "expected a list")),
            None => Err(Error::invalid_state(key, "missing")),
        }
    }
}
