//! Core type definitions for the archive metadata graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A stored document (JSON object, field name -> value)
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Ancestor id -> shortest known distance
pub type DepthMap = BTreeMap<String, u32>;

// Persisted field names. These are part of the storage contract and must not change.

/// Node identifier
pub const ID: &str = "_id";
/// Document type
pub const TYPE: &str = "_type";
/// Domain (tenant) identifier
pub const DOMAIN_ID: &str = "_dom";
/// Immediate parent(s)
pub const UP: &str = "_up";
/// Unit -> ObjectGroup link
pub const OG: &str = "_og";
/// Ancestor-depth map: { ancestor: distance }
pub const UNIT_DEPTHS: &str = "_uds";
/// Ancestor-id list, the indexed twin of `_uds`
pub const UNIT_UPS: &str = "_us";
/// Minimum depth
pub const MIN_DEPTH: &str = "_min";
/// Maximum depth
pub const MAX_DEPTH: &str = "_max";
/// Immediate child count (Unit) or copy count (ObjectGroup)
pub const NB_CHILD: &str = "_nbc";
/// Management rules (opaque)
pub const MANAGEMENT: &str = "_mgt";
/// ObjectGroup usages and versions (opaque)
pub const USAGES: &str = "_uses";

/// Id-only projection
pub const ID_FIELDS: &[&str] = &[ID];

/// Named collection in the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Units,
    ObjectGroups,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Units => "Unit",
            Collection::ObjectGroups => "ObjectGroup",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of node a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Unit,
    ObjectGroup,
    /// Binary objects nested in an ObjectGroup. Declared, not queryable.
    Object,
}

impl NodeKind {
    /// Backing collection, if this kind is stored as top-level documents
    pub fn collection(&self) -> Option<Collection> {
        match self {
            NodeKind::Unit => Some(Collection::Units),
            NodeKind::ObjectGroup => Some(Collection::ObjectGroups),
            NodeKind::Object => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Unit => f.write_str("UNITS"),
            NodeKind::ObjectGroup => f.write_str("OBJECTGROUPS"),
            NodeKind::Object => f.write_str("OBJECTS"),
        }
    }
}

/// Read the `_id` of a document
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID).and_then(|v| v.as_str())
}

/// Fresh random node id
pub fn new_node_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
