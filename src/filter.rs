//! Store predicates, projections and ordering
//!
//! Evaluated with document-store semantics: a predicate on an array field
//! matches when any element matches, and dotted paths descend into sub-documents.

use crate::types::{Document, ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Predicate over a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every document
    All,
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Exists(String, bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    /// Field (scalar or array) intersects `values`
    pub fn any_in<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::In(
            field.to_string(),
            values.into_iter().map(|v| Value::String(v.into())).collect(),
        )
    }

    pub fn id_eq(id: &str) -> Self {
        Filter::eq(ID, id)
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    /// Conjunction that drops `All` members and flattens trivial cases
    pub fn and(filters: Vec<Filter>) -> Self {
        let mut kept: Vec<Filter> = filters.into_iter().filter(|f| *f != Filter::All).collect();
        match kept.len() {
            0 => Filter::All,
            1 => kept.remove(0),
            _ => Filter::And(kept),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => any_value(doc, field, |v| v == value),
            Filter::Ne(field, value) => !any_value(doc, field, |v| v == value),
            Filter::In(field, values) => any_value(doc, field, |v| values.contains(v)),
            Filter::Gt(field, value) => {
                any_value(doc, field, |v| compare(v, value) == Some(Ordering::Greater))
            }
            Filter::Gte(field, value) => any_value(doc, field, |v| {
                matches!(compare(v, value), Some(Ordering::Greater | Ordering::Equal))
            }),
            Filter::Lt(field, value) => {
                any_value(doc, field, |v| compare(v, value) == Some(Ordering::Less))
            }
            Filter::Lte(field, value) => any_value(doc, field, |v| {
                matches!(compare(v, value), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::Exists(field, expected) => get_path(doc, field).is_some() == *expected,
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(filter) => !filter.matches(doc),
        }
    }
}

/// Fields returned by a find
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    All,
    /// Only these fields (plus `_id`)
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include(fields: &[&str]) -> Self {
        Projection::Include(fields.iter().map(|f| f.to_string()).collect())
    }

    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::All => doc.clone(),
            Projection::Include(fields) => doc
                .iter()
                .filter(|(k, _)| k.as_str() == ID || fields.iter().any(|f| f == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Projection::Exclude(fields) => doc
                .iter()
                .filter(|(k, _)| !fields.iter().any(|f| f == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ordering key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: &str) -> Self {
        SortField {
            field: field.to_string(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: &str) -> Self {
        SortField {
            field: field.to_string(),
            direction: SortDirection::Descending,
        }
    }
}

/// Projection, ordering and paging for a find
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindOptions {
    pub projection: Projection,
    pub order_by: Vec<SortField>,
    pub offset: usize,
    /// 0 means unlimited
    pub limit: usize,
}

impl FindOptions {
    pub fn projected(projection: Projection) -> Self {
        FindOptions {
            projection,
            ..FindOptions::default()
        }
    }
}

/// Ordering of two documents under a list of sort keys. Missing fields sort first.
pub fn compare_documents(a: &Document, b: &Document, order_by: &[SortField]) -> Ordering {
    for key in order_by {
        let ord = match (get_path(a, &key.field), get_path(b, &key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = match key.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Resolve a dotted path
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn any_value<F>(doc: &Document, field: &str, pred: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    match get_path(doc, field) {
        Some(Value::Array(items)) => items.iter().any(&pred),
        Some(value) => pred(value),
        None => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
