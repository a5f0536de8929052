//! In-memory document store
//!
//! Reference `DocumentStore` backend used by tests, benchmarks and embedders.
//!
//! Key properties:
//! - One DashMap shard per collection, so a single update holds one write lock
//! - Documents kept in id order for deterministic scans
//! - Operation counters for observing store traffic

use crate::error::{StoreError, StoreResult};
use crate::filter::{compare_documents, get_path, Filter, FindOptions};
use crate::storage::{AggregateStage, DocumentStore, UpdateOutcome};
use crate::types::{document_id, Collection, Document};
use crate::update::UpdateDoc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory store
pub struct MemoryStore {
    collections: DashMap<Collection, BTreeMap<String, Document>>,

    // Operation counters
    inserts: AtomicU64,
    finds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    aggregates: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: DashMap::new(),
            inserts: AtomicU64::new(0),
            finds: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            aggregates: AtomicU64::new(0),
        }
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    /// Raw document by id (bypasses counters)
    pub fn get(&self, collection: Collection, id: &str) -> Option<Document> {
        self.collections
            .get(&collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Get statistics
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            unit_count: self.count(Collection::Units),
            object_group_count: self.count(Collection::ObjectGroups),
            inserts: self.inserts.load(Ordering::Relaxed),
            finds: self.finds.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            aggregates: self.aggregates.load(Ordering::Relaxed),
        }
    }

    fn update_matching(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &UpdateDoc,
        only_first: bool,
    ) -> UpdateOutcome {
        self.updates.fetch_add(1, Ordering::Relaxed);
        let mut outcome = UpdateOutcome::default();

        if let Some(mut docs) = self.collections.get_mut(&collection) {
            for doc in docs.values_mut() {
                if !filter.matches(doc) {
                    continue;
                }
                outcome.matched += 1;
                if update.apply(doc) {
                    outcome.modified += 1;
                }
                if only_first {
                    break;
                }
            }
        }

        outcome
    }

    fn delete_matching(&self, collection: Collection, filter: &Filter, only_first: bool) -> u64 {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let Some(mut docs) = self.collections.get_mut(&collection) else {
            return 0;
        };

        let mut doomed: Vec<String> = docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .collect();
        if only_first {
            doomed.truncate(1);
        }

        for id in &doomed {
            docs.remove(id);
        }
        doomed.len() as u64
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn insert_one(&self, collection: Collection, doc: Document) -> StoreResult<()> {
        self.inserts.fetch_add(1, Ordering::Relaxed);

        let id = document_id(&doc)
            .ok_or_else(|| StoreError::Backend("document has no _id".to_string()))?
            .to_string();

        let mut docs = self.collections.entry(collection).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        docs.insert(id, doc);
        Ok(())
    }

    fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.finds.fetch_add(1, Ordering::Relaxed);

        let mut matched: Vec<Document> = match self.collections.get(&collection) {
            Some(docs) => docs
                .values()
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if !options.order_by.is_empty() {
            matched.sort_by(|a, b| compare_documents(a, b, &options.order_by));
        }

        let limit = if options.limit == 0 { usize::MAX } else { options.limit };

        Ok(matched
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .map(|doc| options.projection.apply(&doc))
            .collect())
    }

    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> StoreResult<UpdateOutcome> {
        Ok(self.update_matching(collection, filter, update, true))
    }

    fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> StoreResult<UpdateOutcome> {
        Ok(self.update_matching(collection, filter, update, false))
    }

    fn delete_one(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        Ok(self.delete_matching(collection, filter, true))
    }

    fn delete_many(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        Ok(self.delete_matching(collection, filter, false))
    }

    fn aggregate(
        &self,
        collection: Collection,
        pipeline: &[AggregateStage],
    ) -> StoreResult<Vec<Document>> {
        self.aggregates.fetch_add(1, Ordering::Relaxed);

        let mut current: Vec<Document> = match self.collections.get(&collection) {
            Some(docs) => docs.values().cloned().collect(),
            None => Vec::new(),
        };

        for stage in pipeline {
            current = match stage {
                AggregateStage::Match(filter) => {
                    current.into_iter().filter(|doc| filter.matches(doc)).collect()
                }
                AggregateStage::Project(projection) => {
                    current.iter().map(|doc| projection.apply(doc)).collect()
                }
                AggregateStage::CollectAll { field, into } => {
                    if current.is_empty() {
                        Vec::new()
                    } else {
                        let collected: Vec<Value> = current
                            .iter()
                            .filter_map(|doc| get_path(doc, field).cloned())
                            .collect();
                        let mut out = Document::new();
                        out.insert(into.clone(), Value::Array(collected));
                        vec![out]
                    }
                }
            };
        }

        Ok(current)
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub unit_count: usize,
    pub object_group_count: usize,
    pub inserts: u64,
    pub finds: u64,
    pub updates: u64,
    pub deletes: u64,
    pub aggregates: u64,
}
