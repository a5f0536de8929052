//! Request plan
//!
//! Parsed form of a metadata request, produced by an external parser and
//! consumed by the step executor: a node kind, requested roots, an ordered
//! list of depth-aware steps and a terminal operation.

use crate::error::{MetaError, MetaResult};
use crate::filter::{Filter, FindOptions, Projection, SortField};
use crate::object_group::{ObjectGroup, OBJECTGROUP_LINK_FIELDS};
use crate::types::{document_id, new_node_id, Document, NodeKind, ID};
use crate::unit::{Unit, UNIT_LINK_FIELDS};
use crate::update::UpdateDoc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Terminal operation of a plan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PlanOperation {
    #[default]
    Select,
    /// Payload of the node to create
    Insert(Document),
    Update(UpdateDoc),
    Delete,
}

/// How a step relates candidates to the previous result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DepthMode {
    /// Explicit ids, checked against the scope
    Path(Vec<String>),
    /// Nodes under the previous result that can sit at depth `d` (d > 0)
    Exact(u32),
    /// Nodes `d` levels below (d > 0) or above (d < 0) the previous result
    Relative(i32),
    /// Immediate children of the previous result, no depth involved
    SameLevel,
}

/// One pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepQuery {
    pub predicate: Filter,
    pub depth: DepthMode,
}

impl StepQuery {
    pub fn new(predicate: Filter, depth: DepthMode) -> Self {
        StepQuery { predicate, depth }
    }

    pub fn path<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StepQuery::new(Filter::All, DepthMode::Path(ids.into_iter().map(Into::into).collect()))
    }

    pub fn exact(predicate: Filter, depth: u32) -> Self {
        StepQuery::new(predicate, DepthMode::Exact(depth))
    }

    pub fn relative(predicate: Filter, depth: i32) -> Self {
        StepQuery::new(predicate, DepthMode::Relative(depth))
    }

    pub fn same_level(predicate: Filter) -> Self {
        StepQuery::new(predicate, DepthMode::SameLevel)
    }
}

/// Parsed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPlan {
    pub operation: PlanOperation,
    pub kind: NodeKind,
    pub roots: BTreeSet<String>,
    pub steps: Vec<StepQuery>,
    pub projection: Projection,
    pub order_by: Vec<SortField>,
    pub offset: usize,
    /// 0 = unlimited
    pub limit: usize,
}

impl RequestPlan {
    pub fn new(operation: PlanOperation, kind: NodeKind) -> Self {
        RequestPlan {
            operation,
            kind,
            roots: BTreeSet::new(),
            steps: Vec::new(),
            projection: Projection::All,
            order_by: Vec::new(),
            offset: 0,
            limit: 0,
        }
    }

    pub fn select(kind: NodeKind) -> Self {
        RequestPlan::new(PlanOperation::Select, kind)
    }

    pub fn insert(kind: NodeKind, payload: Document) -> Self {
        RequestPlan::new(PlanOperation::Insert(payload), kind)
    }

    pub fn update(kind: NodeKind, update: UpdateDoc) -> Self {
        RequestPlan::new(PlanOperation::Update(update), kind)
    }

    pub fn delete(kind: NodeKind) -> Self {
        RequestPlan::new(PlanOperation::Delete, kind)
    }

    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    pub fn with_step(mut self, step: StepQuery) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_order(mut self, order_by: Vec<SortField>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Options of the final Select find
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            projection: self.projection.clone(),
            order_by: self.order_by.clone(),
            offset: self.offset,
            limit: self.limit,
        }
    }

    /// Structural checks run before execution
    pub fn validate(&self, max_depth: u32) -> MetaResult<()> {
        for (rank, step) in self.steps.iter().enumerate() {
            match &step.depth {
                DepthMode::Exact(0) => {
                    return Err(malformed(rank, "exact depth must be at least 1"));
                }
                DepthMode::Exact(d) if *d > max_depth => {
                    let reason = format!("exact depth {} exceeds {}", d, max_depth);
                    return Err(malformed(rank, &reason));
                }
                DepthMode::Relative(d) if d.unsigned_abs() > max_depth => {
                    return Err(malformed(
                        rank,
                        &format!("relative depth {} exceeds {}", d, max_depth),
                    ));
                }
                DepthMode::Path(ids) if ids.is_empty() => {
                    return Err(malformed(rank, "path without ids"));
                }
                _ => {}
            }
        }

        if let PlanOperation::Insert(payload) = &self.operation {
            let doc = insert_document(self.kind, payload);
            let decoded = match self.kind {
                NodeKind::Unit => Unit::from_document(doc).map(|_| ()),
                NodeKind::ObjectGroup => ObjectGroup::from_document(doc).map(|_| ()),
                NodeKind::Object => Ok(()),
            };
            decoded.map_err(|e| MetaError::MalformedPlan(format!("insert payload: {}", e)))?;
        }
        Ok(())
    }
}

/// Insert payload as it is stored: `_id` filled in when missing, link
/// fields dropped. Links only come from the plan's selection.
pub fn insert_document(kind: NodeKind, payload: &Document) -> Document {
    let mut doc = payload.clone();
    if document_id(&doc).is_none() {
        doc.insert(ID.to_string(), new_node_id().into());
    }
    let link_fields = match kind {
        NodeKind::ObjectGroup => OBJECTGROUP_LINK_FIELDS,
        _ => UNIT_LINK_FIELDS,
    };
    for field in link_fields {
        if doc.remove(*field).is_some() {
            debug!(kind = %kind, field, "plan.insert.link_field_ignored");
        }
    }
    doc
}

fn malformed(rank: usize, reason: &str) -> MetaError {
    MetaError::MalformedPlan(format!("step {}: {}", rank, reason))
}

impl fmt::Display for RequestPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let plan = RequestPlan::select(NodeKind::Unit)
            .with_roots(["a"])
            .with_step(StepQuery::relative(Filter::eq("Title", "x"), 2))
            .with_window(5, 10);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.find_options().limit, 10);
        assert_eq!(plan.operation, PlanOperation::Select);
    }

    #[test]
    fn test_validate_depths() {
        let ok = RequestPlan::select(NodeKind::Unit).with_step(StepQuery::exact(Filter::All, 3));
        assert!(ok.validate(10).is_ok());

        for step in [
            StepQuery::exact(Filter::All, 0),
            StepQuery::exact(Filter::All, 11),
            StepQuery::relative(Filter::All, -11),
            StepQuery::path(Vec::<String>::new()),
        ] {
            let plan = RequestPlan::select(NodeKind::Unit).with_step(step);
            assert!(matches!(plan.validate(10), Err(MetaError::MalformedPlan(_))));
        }
    }

    #[test]
    fn test_validate_insert_payload() {
        let good = json!({"Title": "x", "_up": ["a"]}).as_object().cloned().unwrap();
        assert!(RequestPlan::insert(NodeKind::Unit, good).validate(10).is_ok());

        let bad = json!({"_dom": "tenant"}).as_object().cloned().unwrap();
        let err = RequestPlan::insert(NodeKind::Unit, bad).validate(10).unwrap_err();
        assert!(matches!(err, MetaError::MalformedPlan(_)));
    }

    #[test]
    fn test_insert_document_drops_link_fields() {
        let payload = json!({
            "_id": "b", "Title": "x", "_up": ["a"], "_uds": {"a": 3}, "_us": ["a"],
            "_min": 9, "_max": 9, "_nbc": 4, "_og": "g"
        });
        let doc = insert_document(NodeKind::Unit, payload.as_object().unwrap());
        let mut keys: Vec<&str> = doc.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["Title", "_id", "_og"]);

        // a malformed link field no longer matters
        let unit = json!({"_min": "deep"}).as_object().cloned().unwrap();
        assert!(RequestPlan::insert(NodeKind::Unit, unit).validate(10).is_ok());

        let group = json!({"_up": ["a"], "_dom": 1}).as_object().cloned().unwrap();
        let doc = insert_document(NodeKind::ObjectGroup, &group);
        assert!(doc.get("_up").is_none());
        assert_eq!(doc.get("_dom"), Some(&json!(1)));
        assert!(document_id(&doc).is_some());
    }

    #[test]
    fn test_display_is_json() {
        let plan = RequestPlan::delete(NodeKind::ObjectGroup).with_roots(["og1"]);
        let text = plan.to_string();
        let back: RequestPlan = serde_json::from_str(&text).unwrap();
        assert_eq!(back, plan);
    }
}
