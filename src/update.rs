//! Single-document update payloads
//!
//! An `UpdateDoc` groups three stages issued as one write:
//! - union stage: `add_to_set` (list growth) and `merge_min` (map growth)
//! - set stage: `set`, `unset`, and the conditional `min` / `max` bounds
//! - increment stage: `inc`
//!
//! The store applies one `UpdateDoc` to one document atomically.

use crate::types::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateDoc {
    /// Append each value to the array field if absent
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add_to_set: BTreeMap<String, Vec<Value>>,
    /// Merge into the object field, keeping the smaller number on key collisions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub merge_min: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
    /// Replace the number only if the new one is smaller
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub min: BTreeMap<String, i64>,
    /// Replace the number only if the new one is larger
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub max: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inc: BTreeMap<String, i64>,
}

impl UpdateDoc {
    pub fn new() -> Self {
        UpdateDoc::default()
    }

    pub fn add_each_to_set<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let entry = self.add_to_set.entry(field.to_string()).or_default();
        for value in values {
            let value = value.into();
            if !entry.contains(&value) {
                entry.push(value);
            }
        }
        if entry.is_empty() {
            self.add_to_set.remove(field);
        }
        self
    }

    pub fn merge_min<I, K>(mut self, field: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let entry = self.merge_min.entry(field.to_string()).or_default();
        for (key, value) in entries {
            let slot = entry.entry(key.into()).or_insert(value);
            if value < *slot {
                *slot = value;
            }
        }
        if entry.is_empty() {
            self.merge_min.remove(field);
        }
        self
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set.insert(field.to_string(), value.into());
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unset.push(field.to_string());
        self
    }

    pub fn min(mut self, field: &str, value: i64) -> Self {
        self.min.insert(field.to_string(), value);
        self
    }

    pub fn max(mut self, field: &str, value: i64) -> Self {
        self.max.insert(field.to_string(), value);
        self
    }

    pub fn inc(mut self, field: &str, by: i64) -> Self {
        if by != 0 {
            *self.inc.entry(field.to_string()).or_insert(0) += by;
        }
        self
    }

    /// Combine two payloads. Later set values win, unions accumulate.
    pub fn combine(mut self, other: UpdateDoc) -> Self {
        for (field, values) in other.add_to_set {
            self = self.add_each_to_set(&field, values);
        }
        for (field, entries) in other.merge_min {
            self = self.merge_min(&field, entries);
        }
        self.set.extend(other.set);
        self.unset.extend(other.unset);
        for (field, value) in other.min {
            let slot = self.min.entry(field).or_insert(value);
            *slot = (*slot).min(value);
        }
        for (field, value) in other.max {
            let slot = self.max.entry(field).or_insert(value);
            *slot = (*slot).max(value);
        }
        for (field, by) in other.inc {
            self = self.inc(&field, by);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_to_set.is_empty()
            && self.merge_min.is_empty()
            && self.set.is_empty()
            && self.unset.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
            && self.inc.is_empty()
    }

    /// Apply to a document in place. Returns true if anything changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let before = doc.clone();

        for (field, values) in &self.add_to_set {
            let slot = doc
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }

        for (field, entries) in &self.merge_min {
            let slot = doc
                .entry(field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                for (key, value) in entries {
                    let keep_existing = map
                        .get(key)
                        .and_then(|v| v.as_u64())
                        .map(|current| current <= *value)
                        .unwrap_or(false);
                    if !keep_existing {
                        map.insert(key.clone(), Value::from(*value));
                    }
                }
            }
        }

        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }
        for field in &self.unset {
            doc.remove(field);
        }

        for (field, value) in &self.min {
            let current = doc.get(field).and_then(|v| v.as_i64());
            if current.map_or(true, |c| *value < c) {
                doc.insert(field.clone(), Value::from(*value));
            }
        }
        for (field, value) in &self.max {
            let current = doc.get(field).and_then(|v| v.as_i64());
            if current.map_or(true, |c| *value > c) {
                doc.insert(field.clone(), Value::from(*value));
            }
        }

        for (field, by) in &self.inc {
            let current = doc.get(field).and_then(|v| v.as_i64()).unwrap_or(0);
            doc.insert(field.clone(), Value::from(current + by));
        }

        *doc != before
    }
}
