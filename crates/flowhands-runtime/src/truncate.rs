//! Payload truncation.
//!
//! Persisted step payloads and streamed events carry bounded JSON. Long
//! strings are cut and suffixed with [`TRUNCATION_MARKER`]; long arrays keep
//! their first items. Inside an object the original size is recorded next to
//! the field as `<field>_length` (strings) or `<field>_count` (arrays).

use serde_json::{Map, Value};

pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Size limits applied to a JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    pub max_chars: usize,
    pub max_items: usize,
}

impl Truncation {
    pub fn new(max_chars: usize, max_items: usize) -> Self {
        Self {
            max_chars,
            max_items,
        }
    }

    /// Return a bounded copy of `value`.
    pub fn apply(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.cut(s).unwrap_or_else(|| s.clone())),
            Value::Array(items) => Value::Array(self.cut_items(items)),
            Value::Object(map) => Value::Object(self.apply_object(map)),
            other => other.clone(),
        }
    }

    fn apply_object(&self, map: &Map<String, Value>) -> Map<String, Value> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            match value {
                Value::String(s) => match self.cut(s) {
                    Some(cut) => {
                        out.insert(key.clone(), Value::String(cut));
                        out.insert(format!("{}_length", key), Value::from(s.chars().count()));
                    }
                    None => {
                        out.insert(key.clone(), value.clone());
                    }
                },
                Value::Array(items) => {
                    out.insert(key.clone(), Value::Array(self.cut_items(items)));
                    if items.len() > self.max_items {
                        out.insert(format!("{}_count", key), Value::from(items.len()));
                    }
                }
                other => {
                    out.insert(key.clone(), self.apply(other));
                }
            }
        }
        out
    }

    fn cut(&self, s: &str) -> Option<String> {
        if s.chars().count() <= self.max_chars {
            return None;
        }
        let mut cut: String = s.chars().take(self.max_chars).collect();
        cut.push_str(TRUNCATION_MARKER);
        Some(cut)
    }

    fn cut_items(&self, items: &[Value]) -> Vec<Value> {
        items
            .iter()
            .take(self.max_items)
            .map(|item| self.apply(item))
            .collect()
    }
}
