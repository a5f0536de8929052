//! Root resolution
//!
//! Narrows the roots a request asks for against the scope the caller is
//! allowed to start from.

use crate::context::EngineContext;
use crate::error::MetaResult;
use crate::filter::{Filter, FindOptions, Projection};
use crate::result::QueryResult;
use crate::types::{document_id, Collection, NodeKind, ID, ID_FIELDS, UP};
use std::collections::BTreeSet;
use tracing::debug;

/// Ancestor-or-same predicate: id in `ancestors` or `targets`.
///
/// Flat id membership, no graph walk. The empty id is never matched.
pub fn ancestors_or_same(targets: &BTreeSet<String>, ancestors: &BTreeSet<String>) -> Filter {
    Filter::any_in(ID, id_union(targets, ancestors))
}

fn id_union(targets: &BTreeSet<String>, ancestors: &BTreeSet<String>) -> BTreeSet<String> {
    ancestors
        .union(targets)
        .filter(|id| !id.is_empty())
        .cloned()
        .collect()
}

pub struct RootResolver<'a> {
    ctx: &'a EngineContext,
}

impl<'a> RootResolver<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        RootResolver { ctx }
    }

    fn find_ids(&self, collection: Collection, filter: &Filter) -> MetaResult<BTreeSet<String>> {
        let docs = self.ctx.store().find(
            collection,
            filter,
            &FindOptions::projected(Projection::include(ID_FIELDS)),
        )?;
        Ok(docs
            .iter()
            .filter_map(|doc| document_id(doc).map(str::to_string))
            .collect())
    }

    /// Existing ids of `collection` among `current` and the scope. Without
    /// a scope, `current` is returned unchecked.
    pub fn check_against_roots(
        &self,
        collection: Collection,
        current: &BTreeSet<String>,
        scope: Option<&QueryResult>,
    ) -> MetaResult<BTreeSet<String>> {
        match scope {
            None => Ok(current.clone()),
            Some(scope) => {
                self.find_ids(collection, &ancestors_or_same(current, scope.current_ids()))
            }
        }
    }

    pub fn check_unit_against_roots(
        &self,
        current: &BTreeSet<String>,
        scope: Option<&QueryResult>,
    ) -> MetaResult<BTreeSet<String>> {
        self.check_against_roots(Collection::Units, current, scope)
    }

    /// Starting Units of a request
    pub fn resolve_unit_roots(
        &self,
        requested: &BTreeSet<String>,
        scope: Option<&QueryResult>,
    ) -> MetaResult<QueryResult> {
        let roots = self.check_unit_against_roots(requested, scope)?;
        if roots.is_empty() {
            return Ok(QueryResult::new(NodeKind::Unit));
        }
        if !roots.is_superset(requested) {
            debug!(
                requested = requested.len(),
                kept = roots.len(),
                "roots.unit.not_all_roots_preserved"
            );
        }
        Ok(QueryResult::with_ids(NodeKind::Unit, roots))
    }

    /// Starting ObjectGroups of a request
    pub fn resolve_object_group_roots(
        &self,
        requested: &BTreeSet<String>,
        scope: Option<&QueryResult>,
    ) -> MetaResult<QueryResult> {
        let scope = match scope {
            Some(scope) if !scope.is_empty() => scope,
            _ => {
                let ids = requested.iter().cloned();
                return Ok(QueryResult::with_ids(NodeKind::ObjectGroup, ids));
            }
        };
        if requested.is_empty() {
            return Ok(QueryResult::new(NodeKind::ObjectGroup));
        }

        let allowed = id_union(requested, scope.current_ids());
        let filter = Filter::Or(vec![
            Filter::any_in(ID, allowed.iter().cloned()),
            Filter::any_in(UP, allowed.iter().cloned()),
        ]);
        let roots = self.find_ids(Collection::ObjectGroups, &filter)?;
        if roots.is_empty() {
            return Ok(QueryResult::new(NodeKind::ObjectGroup));
        }
        if !roots.is_superset(requested) {
            debug!(
                requested = requested.len(),
                kept = roots.len(),
                "roots.object_group.not_all_roots_preserved"
            );
        }
        Ok(QueryResult::with_ids(NodeKind::ObjectGroup, roots))
    }
}
