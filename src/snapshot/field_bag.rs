//! Ordered key/value container with conditional inserts.
//!
//! # Design Decisions
//! - Backed by `serde_json::Map` with `preserve_order`, so keys serialize in
//!   the order they were first inserted
//! - Re-inserting an existing key replaces the value in place
//! - Conditional inserts never touch the map when the predicate rejects

use serde::Serialize;
use serde_json::{Map, Value};

/// One JSON object under construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldBag {
    fields: Map<String, Value>,
}

impl FieldBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, overwriting any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Insert `value` under `key` only if `predicate(&value)` holds.
    pub fn with_field_if_value<T, P>(self, key: impl Into<String>, value: T, predicate: P) -> Self
    where
        T: Into<Value>,
        P: FnOnce(&T) -> bool,
    {
        if predicate(&value) {
            self.with_field(key, value)
        } else {
            self
        }
    }

    /// Insert `value` under `key` only if `predicate(&value)` does NOT hold.
    ///
    /// Typically used as "insert unless empty".
    pub fn with_field_if_value_not<T, P>(self, key: impl Into<String>, value: T, predicate: P) -> Self
    where
        T: Into<Value>,
        P: FnOnce(&T) -> bool,
    {
        self.with_field_if_value(key, value, |v| !predicate(v))
    }

    /// The underlying ordered mapping.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Look up a single field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl From<FieldBag> for Value {
    fn from(bag: FieldBag) -> Self {
        Value::Object(bag.fields)
    }
}
