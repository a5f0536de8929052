//! Common node behaviour and document decoding
//!
//! Unit and ObjectGroup are plain structs decoded from and encoded to store
//! documents by explicit per-kind functions. `GraphNode` is the small seam the
//! executor drives them through.

use crate::context::EngineContext;
use crate::error::{MetaError, MetaResult};
use crate::filter::{Filter, Projection};
use crate::types::{Collection, DepthMap, Document};
use crate::update::UpdateDoc;
use serde_json::Value;

/// Persistable graph node
pub trait GraphNode: Sized {
    /// Backing collection
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Decode a stored document
    fn from_document(doc: Document) -> MetaResult<Self>;

    /// Encode for the store
    fn to_document(&self) -> Document;

    /// Insert as a new node. Fails with a duplicate key if the id exists.
    fn insert(&mut self, ctx: &EngineContext) -> MetaResult<()>;

    /// Insert the node, or diff its links against the stored copy and write
    /// the difference.
    fn save(&mut self, ctx: &EngineContext) -> MetaResult<()>;

    /// Reload from the store. Returns false (leaving `self` untouched) if the
    /// node no longer exists.
    fn load(&mut self, ctx: &EngineContext) -> MetaResult<bool> {
        let filter = Filter::id_eq(self.id());
        match ctx.store().find_one(Self::COLLECTION, &filter, &Projection::All)? {
            Some(doc) => {
                *self = Self::from_document(doc)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply an update payload to the in-memory copy, the way the store
    /// applies it to the document. Returns true if anything changed.
    fn apply_diff(&mut self, update: &UpdateDoc) -> MetaResult<bool> {
        let mut doc = self.to_document();
        if !update.apply(&mut doc) {
            return Ok(false);
        }
        *self = Self::from_document(doc)?;
        Ok(true)
    }
}

pub(crate) fn invalid(id: &str, reason: impl Into<String>) -> MetaError {
    MetaError::InvalidDocument {
        id: id.to_string(),
        reason: reason.into(),
    }
}

/// Remove and return `_id`
pub(crate) fn take_id(doc: &mut Document) -> MetaResult<String> {
    match doc.remove(crate::types::ID) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        Some(other) => Err(invalid(&other.to_string(), "_id is not a non-empty string")),
        None => Err(invalid("<none>", "missing _id")),
    }
}

pub(crate) fn take_string(
    doc: &mut Document,
    field: &str,
    id: &str,
) -> MetaResult<Option<String>> {
    match doc.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(invalid(id, format!("{} is not a string", field))),
    }
}

/// Accepts an array of strings or a single string
pub(crate) fn take_string_list(
    doc: &mut Document,
    field: &str,
    id: &str,
) -> MetaResult<Vec<String>> {
    match doc.remove(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s]),
        Some(Value::Array(items)) => {
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => {
                        if !out.contains(&s) {
                            out.push(s);
                        }
                    }
                    _ => return Err(invalid(id, format!("{} holds a non-string entry", field))),
                }
            }
            Ok(out)
        }
        Some(_) => Err(invalid(id, format!("{} is not a list", field))),
    }
}

pub(crate) fn take_u64(doc: &mut Document, field: &str, id: &str) -> MetaResult<Option<u64>> {
    match doc.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(id, format!("{} is not a non-negative integer", field))),
    }
}

pub(crate) fn take_u32(doc: &mut Document, field: &str, id: &str) -> MetaResult<Option<u32>> {
    match take_u64(doc, field, id)? {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| invalid(id, format!("{} out of range", field))),
    }
}

pub(crate) fn take_i64(doc: &mut Document, field: &str, id: &str) -> MetaResult<Option<i64>> {
    match doc.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(id, format!("{} is not an integer", field))),
    }
}

pub(crate) fn take_depth_map(doc: &mut Document, field: &str, id: &str) -> MetaResult<DepthMap> {
    match doc.remove(field) {
        None | Some(Value::Null) => Ok(DepthMap::new()),
        Some(Value::Object(map)) => {
            let mut depths = DepthMap::new();
            for (ancestor, distance) in map {
                let distance = distance
                    .as_u64()
                    .and_then(|d| u32::try_from(d).ok())
                    .ok_or_else(|| {
                        invalid(id, format!("{}.{} is not a distance", field, ancestor))
                    })?;
                depths.insert(ancestor, distance);
            }
            Ok(depths)
        }
        Some(_) => Err(invalid(id, format!("{} is not a map", field))),
    }
}

pub(crate) fn string_array(ids: &[String]) -> Value {
    Value::Array(ids.iter().map(|id| Value::String(id.clone())).collect())
}

pub(crate) fn depth_object(depths: &DepthMap) -> Value {
    Value::Object(
        depths
            .iter()
            .map(|(ancestor, distance)| (ancestor.clone(), Value::from(*distance)))
            .collect(),
    )
}
