//! Multi-valued header collection and collapsing.
//!
//! # Design Decisions
//! - Collection keeps the order names were first seen and, per name, the
//!   order values arrived
//! - Collapsed maps are sorted by name (header names are already lowercase
//!   in `http::HeaderMap`)
//! - Values that are not valid UTF-8 are replaced lossily rather than dropped

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Header name → every value observed for it, in encounter order.
pub type HeaderMultiMap = Vec<(String, Vec<String>)>;

/// A header value after collapsing: one string or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CollapsedValue {
    Single(String),
    List(Vec<String>),
}

impl CollapsedValue {
    /// Collapse a value list: zero → `None`, one → scalar, more → list.
    pub fn collapse(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(CollapsedValue::Single),
            _ => Some(CollapsedValue::List(values)),
        }
    }
}

impl std::fmt::Display for CollapsedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollapsedValue::Single(v) => f.write_str(v),
            CollapsedValue::List(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

/// Sorted header map, ready for serialization. Empty lists map to `null`.
pub type CollapsedHeaders = BTreeMap<String, Option<CollapsedValue>>;

/// Gather every header of `headers` as a multi-map.
pub fn collect(headers: &HeaderMap) -> HeaderMultiMap {
    headers
        .keys()
        .map(|name| {
            let values = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            (name.as_str().to_string(), values)
        })
        .collect()
}

/// Collapse a multi-map into a name-sorted single-or-list map.
///
/// A name appearing more than once in the input has its values merged.
pub fn collapse(multi: HeaderMultiMap) -> CollapsedHeaders {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, values) in multi {
        merged.entry(name).or_default().extend(values);
    }

    merged
        .into_iter()
        .map(|(name, values)| (name, CollapsedValue::collapse(values)))
        .collect()
}

/// JSON object form of a collapsed map, keeping its sorted order.
pub fn to_json(collapsed: CollapsedHeaders) -> Map<String, Value> {
    collapsed
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                None => Value::Null,
                Some(CollapsedValue::Single(v)) => Value::String(v),
                Some(CollapsedValue::List(values)) => {
                    Value::Array(values.into_iter().map(Value::String).collect())
                }
            };
            (name, value)
        })
        .collect()
}
