//! Document store adapter
//!
//! The engine never persists anything itself. Every read and write goes
//! through `DocumentStore`, which a backend implements over its own
//! storage, replication and indexing. All calls are blocking.
//!
//! Guarantees expected from an implementation:
//! - one `UpdateDoc` is applied atomically to one document
//! - updates never upsert: unmatched filters are reported, not created
//! - `update_many` / `delete_many` give no cross-document atomicity

use crate::error::StoreResult;
use crate::filter::{Filter, FindOptions, Projection};
use crate::types::{Collection, Document};
use crate::update::UpdateDoc;
use serde::{Deserialize, Serialize};

/// Counts reported by an update call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Stage of an aggregation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateStage {
    Match(Filter),
    Project(Projection),
    /// Collect `field` of every input document (when present) into one
    /// output document holding the array `into`. Yields nothing on empty input.
    CollectAll { field: String, into: String },
}

/// Generic document store
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `DuplicateKey` if `_id` exists.
    fn insert_one(&self, collection: Collection, doc: Document) -> StoreResult<()>;

    fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            projection: projection.clone(),
            limit: 1,
            ..FindOptions::default()
        };
        Ok(self.find(collection, filter, &options)?.into_iter().next())
    }

    /// Update the first matching document
    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> StoreResult<UpdateOutcome>;

    fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete the first matching document, returning the deleted count
    fn delete_one(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    fn delete_many(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    fn aggregate(
        &self,
        collection: Collection,
        pipeline: &[AggregateStage],
    ) -> StoreResult<Vec<Document>>;
}
