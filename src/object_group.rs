//! ObjectGroup node
//!
//! Leaf record holding the binary objects of one or more Units. It has no
//! depth: its only graph field is the list of parent Units (`_up`).

use crate::context::EngineContext;
use crate::error::MetaResult;
use crate::filter::{Filter, Projection};
use crate::link_update;
use crate::node::{
    string_array, take_i64, take_id, take_string, take_string_list, take_u64, GraphNode,
};
use crate::types::{Collection, Document, DOMAIN_ID, ID, NB_CHILD, TYPE, UP, USAGES};
use serde_json::Value;
use tracing::{debug, trace};

/// Fields returned by ObjectGroup traversal steps
pub const OBJECTGROUP_VITAM_FIELDS: &[&str] = &[ID, TYPE, DOMAIN_ID, UP, NB_CHILD];

/// Parent links, only ever written by `Unit::add_object_group`
pub const OBJECTGROUP_LINK_FIELDS: &[&str] = &[UP];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectGroup {
    pub id: String,
    pub domain_id: Option<i64>,
    pub og_type: Option<String>,
    /// Parent Units (`_up`)
    pub parents: Vec<String>,
    /// Number of copies (`_nbc`)
    pub nb_copies: u64,
    /// Usages and versions (`_uses`), opaque
    pub usages: Option<Value>,
    pub content: Document,
}

impl ObjectGroup {
    pub const INDEXED_FIELDS: &'static [&'static str] = &[UP, DOMAIN_ID, TYPE];

    pub fn new(id: &str) -> Self {
        ObjectGroup {
            id: id.to_string(),
            ..ObjectGroup::default()
        }
    }

    pub fn from_document(mut doc: Document) -> MetaResult<Self> {
        let id = take_id(&mut doc)?;
        Ok(ObjectGroup {
            domain_id: take_i64(&mut doc, DOMAIN_ID, &id)?,
            og_type: take_string(&mut doc, TYPE, &id)?,
            parents: take_string_list(&mut doc, UP, &id)?,
            nb_copies: take_u64(&mut doc, NB_CHILD, &id)?.unwrap_or(0),
            usages: doc.remove(USAGES).filter(|v| !v.is_null()),
            content: doc,
            id,
        })
    }

    pub fn to_document(&self) -> Document {
        let mut doc = self.content.clone();
        doc.insert(ID.to_string(), Value::from(self.id.as_str()));
        if let Some(og_type) = &self.og_type {
            doc.insert(TYPE.to_string(), Value::from(og_type.as_str()));
        }
        if let Some(domain_id) = self.domain_id {
            doc.insert(DOMAIN_ID.to_string(), Value::from(domain_id));
        }
        doc.insert(UP.to_string(), string_array(&self.parents));
        doc.insert(NB_CHILD.to_string(), Value::from(self.nb_copies));
        if let Some(usages) = &self.usages {
            doc.insert(USAGES.to_string(), usages.clone());
        }
        doc
    }
}

impl GraphNode for ObjectGroup {
    const COLLECTION: Collection = Collection::ObjectGroups;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_document(doc: Document) -> MetaResult<Self> {
        ObjectGroup::from_document(doc)
    }

    fn to_document(&self) -> Document {
        ObjectGroup::to_document(self)
    }

    fn insert(&mut self, ctx: &EngineContext) -> MetaResult<()> {
        ctx.store().insert_one(Self::COLLECTION, self.to_document())?;
        debug!(id = %self.id, "object_group.insert");
        Ok(())
    }

    fn save(&mut self, ctx: &EngineContext) -> MetaResult<()> {
        let filter = Filter::id_eq(&self.id);
        let projection = Projection::include(OBJECTGROUP_VITAM_FIELDS);
        let Some(doc) = ctx.store().find_one(Self::COLLECTION, &filter, &projection)? else {
            return self.insert(ctx);
        };

        let persisted = ObjectGroup::from_document(doc)?;
        let update = link_update::object_group_update(self, &persisted);
        if update.is_empty() {
            trace!(id = %self.id, "object_group.save.unchanged");
        } else {
            ctx.store().update_one(Self::COLLECTION, &filter, &update)?;
            debug!(id = %self.id, "object_group.save.updated");
        }
        Ok(())
    }
}
