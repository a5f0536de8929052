//! Archival Unit node
//!
//! A Unit is a member of the description DAG. Besides its immediate parents
//! (`_up`) it carries a denormalised ancestor index maintained on every link:
//! - `_uds`: ancestor id -> shortest known distance
//! - `_us`: the same ancestor ids as an indexed list
//! - `_min` / `_max`: shortest and longest path from a root, roots being at 1
//!
//! Distances only shrink over a Unit's lifetime. Links write the child once
//! per parent (no upsert) and bump a pending child counter on the parent,
//! persisted by the parent's next `save`.

use crate::context::EngineContext;
use crate::error::{MetaError, MetaResult};
use crate::filter::{Filter, FindOptions, Projection};
use crate::link_update;
use crate::node::{
    depth_object, string_array, take_depth_map, take_i64, take_id, take_string, take_string_list,
    take_u32, take_u64, GraphNode,
};
use crate::object_group::ObjectGroup;
use crate::relation::{link_payload, LinkEnd, LinkField, UNIT_TO_OBJECT_GROUP, UNIT_TO_UNIT};
use crate::types::{
    document_id, Collection, DepthMap, Document, DOMAIN_ID, ID, ID_FIELDS, MANAGEMENT, MAX_DEPTH,
    MIN_DEPTH, NB_CHILD, OG, TYPE, UNIT_DEPTHS, UNIT_UPS, UP,
};
use crate::update::UpdateDoc;
use serde_json::Value;
use tracing::{debug, trace};

/// Fields kept in cached snapshots and returned by traversal steps
pub const UNIT_VITAM_FIELDS: &[&str] = &[
    NB_CHILD,
    TYPE,
    UNIT_UPS,
    UNIT_DEPTHS,
    MIN_DEPTH,
    MAX_DEPTH,
    DOMAIN_ID,
    UP,
    OG,
    ID,
];

/// Graph-maintained fields. Set by linking, never taken from an insert payload.
pub const UNIT_LINK_FIELDS: &[&str] =
    &[UP, UNIT_DEPTHS, UNIT_UPS, MIN_DEPTH, MAX_DEPTH, NB_CHILD];

/// Start value of the min-depth search, meaning no parent resolved yet
const UNRESOLVED_DEPTH: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unit {
    pub id: String,
    /// Tenant (`_dom`)
    pub domain_id: Option<i64>,
    /// Document type (`_type`)
    pub unit_type: Option<String>,
    /// Management rules (`_mgt`), opaque
    pub management: Option<Value>,
    /// Immediate parents (`_up`)
    pub parents: Vec<String>,
    /// Attached ObjectGroup (`_og`)
    pub object_group: Option<String>,
    /// Ancestor -> distance (`_uds`)
    pub depths: DepthMap,
    /// Ancestor ids (`_us`)
    pub ancestors: Vec<String>,
    pub min_depth: u32,
    pub max_depth: u32,
    /// Immediate child count (`_nbc`)
    pub nb_children: u64,
    /// Every non-reserved field, verbatim
    pub content: Document,
    /// Children linked since the last save
    pub(crate) pending_children: u64,
}

impl Unit {
    /// Fields an external store should index for the traversal queries
    pub const INDEXED_FIELDS: &'static [&'static str] =
        &[UP, OG, DOMAIN_ID, UNIT_UPS, MIN_DEPTH, MAX_DEPTH, TYPE];

    pub fn new(id: &str) -> Self {
        Unit {
            id: id.to_string(),
            ..Unit::default()
        }
    }

    /// Decode a stored document. Unknown fields land in `content`.
    pub fn from_document(mut doc: Document) -> MetaResult<Self> {
        let id = take_id(&mut doc)?;
        let unit = Unit {
            domain_id: take_i64(&mut doc, DOMAIN_ID, &id)?,
            unit_type: take_string(&mut doc, TYPE, &id)?,
            management: doc.remove(MANAGEMENT).filter(|v| !v.is_null()),
            parents: take_string_list(&mut doc, UP, &id)?,
            object_group: take_string(&mut doc, OG, &id)?,
            depths: take_depth_map(&mut doc, UNIT_DEPTHS, &id)?,
            ancestors: take_string_list(&mut doc, UNIT_UPS, &id)?,
            min_depth: take_u32(&mut doc, MIN_DEPTH, &id)?.unwrap_or(0),
            max_depth: take_u32(&mut doc, MAX_DEPTH, &id)?.unwrap_or(0),
            nb_children: take_u64(&mut doc, NB_CHILD, &id)?.unwrap_or(0),
            content: doc,
            pending_children: 0,
            id,
        };
        Ok(unit)
    }

    pub fn to_document(&self) -> Document {
        let mut doc = self.content.clone();
        doc.insert(ID.to_string(), Value::from(self.id.as_str()));
        if let Some(unit_type) = &self.unit_type {
            doc.insert(TYPE.to_string(), Value::from(unit_type.as_str()));
        }
        if let Some(domain_id) = self.domain_id {
            doc.insert(DOMAIN_ID.to_string(), Value::from(domain_id));
        }
        if let Some(management) = &self.management {
            doc.insert(MANAGEMENT.to_string(), management.clone());
        }
        doc.insert(UP.to_string(), string_array(&self.parents));
        if let Some(og) = &self.object_group {
            doc.insert(OG.to_string(), Value::from(og.as_str()));
        }
        doc.insert(UNIT_DEPTHS.to_string(), depth_object(&self.depths));
        doc.insert(UNIT_UPS.to_string(), string_array(&self.ancestors));
        doc.insert(MIN_DEPTH.to_string(), Value::from(self.min_depth));
        doc.insert(MAX_DEPTH.to_string(), Value::from(self.max_depth));
        doc.insert(NB_CHILD.to_string(), Value::from(self.nb_children));
        doc
    }

    pub fn parent_ids(&self) -> &[String] {
        &self.parents
    }

    pub fn is_immediate_parent(&self, id: &str) -> bool {
        self.parents.iter().any(|p| p == id)
    }

    pub fn object_group_id(&self) -> Option<&str> {
        self.object_group.as_deref()
    }

    /// Children linked in memory but not yet counted in the store
    pub fn pending_children(&self) -> u64 {
        self.pending_children
    }

    /// Ancestor map handed to a child: own map one level further, plus self at 1
    pub fn sub_depths(&self) -> DepthMap {
        let mut depths: DepthMap = self
            .depths
            .iter()
            .map(|(ancestor, distance)| (ancestor.clone(), distance + 1))
            .collect();
        depths.insert(self.id.clone(), 1);
        depths
    }

    /// Ancestor list handed to a child: own list plus self
    pub fn sub_ancestors(&self) -> Vec<String> {
        let mut ancestors = self.ancestors.clone();
        if !ancestors.contains(&self.id) {
            ancestors.push(self.id.clone());
        }
        ancestors
    }

    /// One more than the farthest recorded ancestor
    pub fn compute_max_depth(&self) -> u32 {
        1 + self.depths.values().copied().max().unwrap_or(0)
    }

    /// One more than the shallowest immediate parent, 1 when none resolves
    pub fn compute_min_depth(&self, ctx: &EngineContext) -> MetaResult<u32> {
        let mut depth = if self.min_depth == 0 {
            UNRESOLVED_DEPTH
        } else {
            self.min_depth
        };
        for parent_id in &self.parents {
            if let Some(parent) = ctx.cache.get(parent_id, ctx.store())? {
                depth = depth.min(parent.min_depth.max(1) + 1);
            }
        }
        if depth == UNRESOLVED_DEPTH {
            depth = 1;
        }
        Ok(depth)
    }

    fn refresh_depths(&mut self, ctx: &EngineContext) -> MetaResult<()> {
        self.min_depth = self.compute_min_depth(ctx)?;
        self.max_depth = self.compute_max_depth().max(self.min_depth);
        Ok(())
    }

    /// Ancestor closure and max depth written on a new child
    fn closure_update(&self) -> UpdateDoc {
        let max = self.max_depth.max(1) + 1;
        UpdateDoc::new()
            .merge_min(
                UNIT_DEPTHS,
                self.sub_depths().into_iter().map(|(k, v)| (k, u64::from(v))),
            )
            .add_each_to_set(UNIT_UPS, self.sub_ancestors())
            .max(MAX_DEPTH, i64::from(max))
    }

    /// Min depth written on a new child.
    ///
    /// A child without parents holds the root placeholder depth of 1, so its
    /// min depth is replaced rather than lowered.
    fn min_depth_update(&self, first_parent: bool) -> UpdateDoc {
        let min = self.min_depth.max(1) + 1;
        if first_parent {
            UpdateDoc::new().set(MIN_DEPTH, min)
        } else {
            UpdateDoc::new().min(MIN_DEPTH, i64::from(min))
        }
    }

    fn check_link(&self, child: &Unit, max_depth: u32) -> MetaResult<()> {
        if child.id == self.id || self.depths.contains_key(&child.id) {
            return Err(MetaError::UnsupportedOperation(format!(
                "linking {} under {} would create a cycle",
                child.id, self.id
            )));
        }
        let depth = self.max_depth.max(1) + 1;
        if depth > max_depth {
            return Err(MetaError::MaxDepthExceeded {
                id: child.id.clone(),
                depth,
                max: max_depth,
            });
        }
        Ok(())
    }

    /// Link `child` under this Unit.
    ///
    /// Writes the child only (parent id, ancestor closure, depth bounds) in a
    /// single update. Returns false when the child was already linked or no
    /// longer exists; otherwise the child is updated in memory and cached,
    /// and this Unit's pending child count grows.
    pub fn add_unit(&mut self, child: &mut Unit, ctx: &EngineContext) -> MetaResult<bool> {
        let payload = link_payload(
            &UNIT_TO_UNIT,
            &LinkEnd::new(&self.id, LinkField::None),
            &LinkEnd::new(&child.id, LinkField::Many(&child.parents)),
        );
        if payload.on_b.is_empty() {
            trace!(parent = %self.id, child = %child.id, "unit.add_unit.already_linked");
            return Ok(false);
        }
        self.check_link(child, ctx.config.max_depth)?;

        let update = payload
            .on_b
            .combine(self.closure_update())
            .combine(self.min_depth_update(child.parents.is_empty()));
        let outcome = ctx
            .store()
            .update_one(Collection::Units, &Filter::id_eq(&child.id), &update)?;
        if outcome.matched == 0 {
            debug!(parent = %self.id, child = %child.id, "unit.add_unit.child_missing");
            return Ok(false);
        }

        self.pending_children += outcome.matched;
        child.apply_diff(&update)?;
        ctx.cache.put(child.clone());
        debug!(
            parent = %self.id,
            child = %child.id,
            min = child.min_depth,
            max = child.max_depth,
            "unit.add_unit"
        );
        Ok(true)
    }

    /// Link several children at once.
    ///
    /// One many-document write carries the link and closure, then the min
    /// depth bound is written per group. Returns the number of children
    /// matched in the store; the others are skipped.
    pub fn add_units(&mut self, children: &mut [Unit], ctx: &EngineContext) -> MetaResult<u64> {
        let mut roots: Vec<String> = Vec::new();
        let mut linked: Vec<String> = Vec::new();
        for child in children.iter() {
            if child.is_immediate_parent(&self.id) {
                continue;
            }
            self.check_link(child, ctx.config.max_depth)?;
            if child.parents.is_empty() {
                roots.push(child.id.clone());
            } else {
                linked.push(child.id.clone());
            }
        }
        if roots.is_empty() && linked.is_empty() {
            return Ok(0);
        }

        let all_ids = roots.iter().chain(linked.iter()).cloned();
        let outcome = ctx.store().update_many(
            Collection::Units,
            &Filter::any_in(ID, all_ids),
            &UpdateDoc::new()
                .add_each_to_set(UP, [self.id.as_str()])
                .combine(self.closure_update()),
        )?;
        for (ids, first_parent) in [(&roots, true), (&linked, false)] {
            if ids.is_empty() {
                continue;
            }
            ctx.store().update_many(
                Collection::Units,
                &Filter::any_in(ID, ids.iter().cloned()),
                &self.min_depth_update(first_parent),
            )?;
        }
        self.pending_children += outcome.matched;

        // Refresh the in-memory copies from what the store now holds
        for child in children.iter_mut() {
            if !roots.contains(&child.id) && !linked.contains(&child.id) {
                continue;
            }
            if child.load(ctx)? {
                ctx.cache.put(child.clone());
            }
        }
        debug!(parent = %self.id, matched = outcome.matched, "unit.add_units");
        Ok(outcome.matched)
    }

    /// Attach `group` to this Unit: `_og` on the Unit, the Unit id added to
    /// the group's `_up`. Both sides are written and updated in memory.
    pub fn add_object_group(
        &mut self,
        group: &mut ObjectGroup,
        ctx: &EngineContext,
    ) -> MetaResult<bool> {
        let current = match self.object_group.as_deref() {
            Some(og) => LinkField::One(og),
            None => LinkField::None,
        };
        let payload = link_payload(
            &UNIT_TO_OBJECT_GROUP,
            &LinkEnd::new(&self.id, current),
            &LinkEnd::new(&group.id, LinkField::Many(&group.parents)),
        );
        if payload.is_empty() {
            return Ok(false);
        }

        if !payload.on_b.is_empty() {
            let outcome = ctx.store().update_one(
                Collection::ObjectGroups,
                &Filter::id_eq(&group.id),
                &payload.on_b,
            )?;
            if outcome.matched == 0 {
                debug!(unit = %self.id, group = %group.id, "unit.add_object_group.group_missing");
                return Ok(false);
            }
            group.apply_diff(&payload.on_b)?;
        }
        if !payload.on_a.is_empty() {
            ctx.store().update_one(Collection::Units, &Filter::id_eq(&self.id), &payload.on_a)?;
            self.apply_diff(&payload.on_a)?;
            ctx.cache.put(self.clone());
        }
        debug!(unit = %self.id, group = %group.id, "unit.add_object_group");
        Ok(true)
    }

    /// Ids of the Units listing this one as immediate parent (store lookup)
    pub fn children_ids(&self, ctx: &EngineContext) -> MetaResult<Vec<String>> {
        let docs = ctx.store().find(
            Collection::Units,
            &Filter::eq(UP, self.id.as_str()),
            &FindOptions::projected(Projection::include(ID_FIELDS)),
        )?;
        Ok(docs
            .iter()
            .filter_map(|doc| document_id(doc).map(str::to_string))
            .collect())
    }
}

impl GraphNode for Unit {
    const COLLECTION: Collection = Collection::Units;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_document(doc: Document) -> MetaResult<Self> {
        Unit::from_document(doc)
    }

    fn to_document(&self) -> Document {
        Unit::to_document(self)
    }

    fn insert(&mut self, ctx: &EngineContext) -> MetaResult<()> {
        self.refresh_depths(ctx)?;
        ctx.store().insert_one(Self::COLLECTION, self.to_document())?;
        debug!(id = %self.id, min = self.min_depth, max = self.max_depth, "unit.insert");
        ctx.cache.put(self.clone());
        Ok(())
    }

    fn save(&mut self, ctx: &EngineContext) -> MetaResult<()> {
        let projection = Projection::include(UNIT_VITAM_FIELDS);
        let filter = Filter::id_eq(&self.id);
        let Some(doc) = ctx.store().find_one(Self::COLLECTION, &filter, &projection)? else {
            return self.insert(ctx);
        };

        self.refresh_depths(ctx)?;
        let persisted = Unit::from_document(doc)?;
        let update = link_update::unit_update(self, &persisted);
        if update.is_empty() {
            trace!(id = %self.id, "unit.save.unchanged");
        } else {
            ctx.store().update_one(Self::COLLECTION, &filter, &update)?;
            debug!(id = %self.id, "unit.save.updated");
        }
        ctx.cache.put(self.clone());
        Ok(())
    }

    fn apply_diff(&mut self, update: &UpdateDoc) -> MetaResult<bool> {
        let mut doc = self.to_document();
        if !update.apply(&mut doc) {
            return Ok(false);
        }
        let pending = self.pending_children;
        *self = Unit::from_document(doc)?;
        self.pending_children = pending;
        Ok(true)
    }
}
