//! Diff-based incremental persistence
//!
//! Saving a node that already exists never rewrites it. Its in-memory state
//! is compared with the stored snapshot and only the growth is written, as a
//! single `UpdateDoc`:
//! - union stage: new parents, new ancestor ids, ancestor distances to lower
//! - set stage: a changed `_og`, lower `_min`, higher `_max`
//! - increment stage: children linked since the last save
//!
//! Nothing is ever removed. Whatever the store knows better (an ancestor the
//! memory copy missed, a shorter distance) is adopted locally instead.

use crate::object_group::ObjectGroup;
use crate::relation::{diff_many, diff_one};
use crate::types::{DepthMap, MAX_DEPTH, MIN_DEPTH, NB_CHILD, OG, UNIT_DEPTHS, UNIT_UPS, UP};
use crate::unit::Unit;
use crate::update::UpdateDoc;

/// Merge persisted distances into `current` and return the distances the
/// store still has to lower or learn.
pub fn depth_delta(current: &mut DepthMap, persisted: &DepthMap) -> DepthMap {
    let mut delta = DepthMap::new();
    for (ancestor, past) in persisted {
        match current.get(ancestor) {
            Some(now) if now < past => {
                delta.insert(ancestor.clone(), *now);
            }
            Some(now) if now == past => {}
            _ => {
                current.insert(ancestor.clone(), *past);
            }
        }
    }
    for (ancestor, now) in current.iter() {
        if !persisted.contains_key(ancestor) {
            delta.insert(ancestor.clone(), *now);
        }
    }
    delta
}

fn union_into(current: &mut Vec<String>, persisted: &[String]) {
    for id in persisted {
        if !current.contains(id) {
            current.push(id.clone());
        }
    }
}

/// Update bringing the stored Unit up to `current`.
///
/// `current` is adjusted in place: persisted links are merged back and the
/// pending child count moves into `nb_children`.
pub fn unit_update(current: &mut Unit, persisted: &Unit) -> UpdateDoc {
    let mut update = diff_many(UP, &current.parents, &persisted.parents);
    union_into(&mut current.parents, &persisted.parents);

    let delta = depth_delta(&mut current.depths, &persisted.depths);
    update = update.merge_min(
        UNIT_DEPTHS,
        delta.into_iter().map(|(k, v)| (k, u64::from(v))),
    );

    update = update.combine(diff_many(UNIT_UPS, &current.ancestors, &persisted.ancestors));
    union_into(&mut current.ancestors, &persisted.ancestors);

    update = update.combine(diff_one(
        OG,
        current.object_group.as_deref(),
        persisted.object_group.as_deref(),
    ));
    if current.object_group.is_none() {
        current.object_group = persisted.object_group.clone();
    }

    let lowered = persisted.min_depth == 0 || current.min_depth < persisted.min_depth;
    if current.min_depth > 0 && lowered {
        update = update.min(MIN_DEPTH, i64::from(current.min_depth));
    } else if persisted.min_depth > 0 {
        current.min_depth = persisted.min_depth;
    }
    if current.max_depth > persisted.max_depth {
        update = update.max(MAX_DEPTH, i64::from(current.max_depth));
    } else {
        current.max_depth = persisted.max_depth;
    }

    let pending = current.pending_children;
    update = update.inc(NB_CHILD, pending as i64);
    current.pending_children = 0;
    current.nb_children = persisted.nb_children + pending;

    update
}

/// Update bringing the stored ObjectGroup up to `current`
pub fn object_group_update(current: &mut ObjectGroup, persisted: &ObjectGroup) -> UpdateDoc {
    let update = diff_many(UP, &current.parents, &persisted.parents);
    union_into(&mut current.parents, &persisted.parents);
    update
}
