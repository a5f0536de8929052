//! Link descriptors and the cardinality algebra shared by every relation
//!
//! A relation joins a node A of `source` to a node B of `target`. Its kind
//! decides which side stores what; `link_payload` turns a pair of link ends
//! into the update each side needs. The function is pure: callers write the
//! payloads to the store and apply them locally.

use crate::types::{Collection, OG, UP};
use crate::update::UpdateDoc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cardinality and symmetry of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// A.field_a = B; nothing on B
    AsymmetricOne,
    /// A.field_a = B; B.field_b = A when changed
    SymmetricOneOne,
    /// B appended to A.field_a; nothing on B
    AsymmetricMany,
    /// A.field_a = B; A appended to B.field_b
    SymmetricOneMany,
    /// B appended to A.field_a; B.field_b = A when changed
    SymmetricManyOne,
    /// B appended to A.field_a; A appended to B.field_b
    SymmetricManyMany,
    /// Many-to-many stored on the child only: A appended to B.field_b.
    /// The parent keeps a child counter instead of a forward list.
    DuplicateManyMany,
}

/// Immutable link descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: Collection,
    pub kind: RelationKind,
    pub field_a: &'static str,
    pub target: Collection,
    pub field_b: &'static str,
}

/// Parent Unit -> child Unit. Only the child stores `_up`.
pub const UNIT_TO_UNIT: Relation = Relation {
    source: Collection::Units,
    kind: RelationKind::DuplicateManyMany,
    field_a: "_down",
    target: Collection::Units,
    field_b: UP,
};

/// Unit -> ObjectGroup. The Unit holds `_og`, the group lists its Units in `_up`.
pub const UNIT_TO_OBJECT_GROUP: Relation = Relation {
    source: Collection::Units,
    kind: RelationKind::SymmetricOneMany,
    field_a: OG,
    target: Collection::ObjectGroups,
    field_b: UP,
};

/// Current state of one side's link field
#[derive(Debug, Clone, PartialEq)]
pub enum LinkField<'a> {
    None,
    One(&'a str),
    Many(&'a [String]),
}

impl LinkField<'_> {
    fn holds(&self, id: &str) -> bool {
        match self {
            LinkField::None => false,
            LinkField::One(current) => *current == id,
            LinkField::Many(ids) => ids.iter().any(|x| x == id),
        }
    }
}

/// One end of a link: node id and the current value of its link field
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEnd<'a> {
    pub id: &'a str,
    pub field: LinkField<'a>,
}

impl<'a> LinkEnd<'a> {
    pub fn new(id: &'a str, field: LinkField<'a>) -> Self {
        LinkEnd { id, field }
    }
}

/// Updates for each side. Empty means no write for that side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkPayload {
    pub on_a: UpdateDoc,
    pub on_b: UpdateDoc,
}

impl LinkPayload {
    pub fn is_empty(&self) -> bool {
        self.on_a.is_empty() && self.on_b.is_empty()
    }
}

fn set_one(field: &str, current: &LinkField<'_>, id: &str) -> UpdateDoc {
    if current.holds(id) {
        UpdateDoc::new()
    } else {
        UpdateDoc::new().set(field, Value::from(id))
    }
}

fn add_many(field: &str, current: &LinkField<'_>, id: &str) -> UpdateDoc {
    if current.holds(id) {
        UpdateDoc::new()
    } else {
        UpdateDoc::new().add_each_to_set(field, [id])
    }
}

/// Compute what linking A to B writes on each side
pub fn link_payload(relation: &Relation, a: &LinkEnd<'_>, b: &LinkEnd<'_>) -> LinkPayload {
    let (fa, fb) = (relation.field_a, relation.field_b);
    match relation.kind {
        RelationKind::AsymmetricOne => LinkPayload {
            on_a: set_one(fa, &a.field, b.id),
            on_b: UpdateDoc::new(),
        },
        RelationKind::SymmetricOneOne => LinkPayload {
            on_a: set_one(fa, &a.field, b.id),
            on_b: set_one(fb, &b.field, a.id),
        },
        RelationKind::AsymmetricMany => LinkPayload {
            on_a: add_many(fa, &a.field, b.id),
            on_b: UpdateDoc::new(),
        },
        RelationKind::SymmetricOneMany => LinkPayload {
            on_a: set_one(fa, &a.field, b.id),
            on_b: add_many(fb, &b.field, a.id),
        },
        RelationKind::SymmetricManyOne => LinkPayload {
            on_a: add_many(fa, &a.field, b.id),
            on_b: set_one(fb, &b.field, a.id),
        },
        RelationKind::SymmetricManyMany => LinkPayload {
            on_a: add_many(fa, &a.field, b.id),
            on_b: add_many(fb, &b.field, a.id),
        },
        RelationKind::DuplicateManyMany => LinkPayload {
            on_a: UpdateDoc::new(),
            on_b: add_many(fb, &b.field, a.id),
        },
    }
}

/// Set-stage diff of a single-valued link field against its persisted value
pub fn diff_one(field: &str, current: Option<&str>, persisted: Option<&str>) -> UpdateDoc {
    match current {
        Some(id) if Some(id) != persisted => UpdateDoc::new().set(field, Value::from(id)),
        _ => UpdateDoc::new(),
    }
}

/// Union-stage diff of a multi-valued link field: ids not yet persisted
pub fn diff_many(field: &str, current: &[String], persisted: &[String]) -> UpdateDoc {
    let added: Vec<&String> = current.iter().filter(|id| !persisted.contains(id)).collect();
    UpdateDoc::new().add_each_to_set(field, added.into_iter().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relation(kind: RelationKind) -> Relation {
        Relation {
            source: Collection::Units,
            kind,
            field_a: "fa",
            target: Collection::Units,
            field_b: "fb",
        }
    }

    #[test]
    fn test_unit_to_unit_writes_child_only() {
        let parents: Vec<String> = vec![];
        let payload = link_payload(
            &UNIT_TO_UNIT,
            &LinkEnd::new("p", LinkField::None),
            &LinkEnd::new("c", LinkField::Many(&parents)),
        );
        assert!(payload.on_a.is_empty());
        assert_eq!(payload.on_b.add_to_set["_up"], vec![json!("p")]);
    }

    #[test]
    fn test_existing_link_is_noop() {
        let parents = vec!["p".to_string()];
        let payload = link_payload(
            &UNIT_TO_UNIT,
            &LinkEnd::new("p", LinkField::None),
            &LinkEnd::new("c", LinkField::Many(&parents)),
        );
        assert!(payload.is_empty());
    }

    #[test]
    fn test_unit_to_object_group() {
        let payload = link_payload(
            &UNIT_TO_OBJECT_GROUP,
            &LinkEnd::new("u", LinkField::None),
            &LinkEnd::new("og", LinkField::Many(&[])),
        );
        assert_eq!(payload.on_a.set["_og"], json!("og"));
        assert_eq!(payload.on_b.add_to_set["_up"], vec![json!("u")]);
    }

    #[test]
    fn test_each_kind() {
        let a = LinkEnd::new("a", LinkField::None);
        let b = LinkEnd::new("b", LinkField::One("a"));

        let p = link_payload(&relation(RelationKind::AsymmetricOne), &a, &b);
        assert_eq!(p.on_a.set["fa"], json!("b"));
        assert!(p.on_b.is_empty());

        // B already points at A: only A is written
        let p = link_payload(&relation(RelationKind::SymmetricOneOne), &a, &b);
        assert_eq!(p.on_a.set["fa"], json!("b"));
        assert!(p.on_b.is_empty());

        let p = link_payload(&relation(RelationKind::AsymmetricMany), &a, &b);
        assert_eq!(p.on_a.add_to_set["fa"], vec![json!("b")]);
        assert!(p.on_b.is_empty());

        let fresh = LinkEnd::new("b", LinkField::None);
        let p = link_payload(&relation(RelationKind::SymmetricManyOne), &a, &fresh);
        assert_eq!(p.on_a.add_to_set["fa"], vec![json!("b")]);
        assert_eq!(p.on_b.set["fb"], json!("a"));

        let p = link_payload(&relation(RelationKind::SymmetricManyMany), &a, &fresh);
        assert_eq!(p.on_a.add_to_set["fa"], vec![json!("b")]);
        assert_eq!(p.on_b.add_to_set["fb"], vec![json!("a")]);
    }

    #[test]
    fn test_diffs() {
        assert!(diff_one("_og", Some("g"), Some("g")).is_empty());
        assert!(diff_one("_og", None, Some("g")).is_empty());
        assert_eq!(diff_one("_og", Some("h"), Some("g")).set["_og"], json!("h"));

        let current = vec!["a".to_string(), "b".to_string()];
        let persisted = vec!["a".to_string()];
        assert_eq!(diff_many("_up", &current, &persisted).add_to_set["_up"], vec![json!("b")]);
        assert!(diff_many("_up", &persisted, &current).is_empty());
    }
}
