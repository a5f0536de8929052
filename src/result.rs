//! Query result accumulator
//!
//! Carried from one pipeline step to the next: the working id set, a result
//! count, the final projected documents of a Select, and for the error
//! variant an ordered list of diagnostics.

use crate::error::{MetaError, MetaResult};
use crate::types::{Document, NodeKind};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub kind: NodeKind,
    current_ids: BTreeSet<String>,
    nb_result: u64,
    finals: Option<Vec<Document>>,
    errors: Option<Vec<String>>,
}

impl QueryResult {
    pub fn new(kind: NodeKind) -> Self {
        QueryResult {
            kind,
            current_ids: BTreeSet::new(),
            nb_result: 0,
            finals: None,
            errors: None,
        }
    }

    /// Result holding `ids`, count set to their number
    pub fn with_ids<I, S>(kind: NodeKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = QueryResult::new(kind);
        for id in ids {
            result.add_id(id);
        }
        result.nb_result = result.current_ids.len() as u64;
        result
    }

    /// Error variant, without diagnostics yet
    pub fn error(kind: NodeKind) -> Self {
        QueryResult {
            errors: Some(Vec::new()),
            ..QueryResult::new(kind)
        }
    }

    /// Drop ids, count and final documents
    pub fn clear(&mut self) {
        self.current_ids.clear();
        self.nb_result = 0;
        self.finals = None;
    }

    /// Absorb the ids and count of `other`
    pub fn put_from(&mut self, other: &QueryResult) {
        self.current_ids.extend(other.current_ids.iter().cloned());
        self.nb_result = other.nb_result;
    }

    pub fn add_id(&mut self, id: impl Into<String>) {
        self.current_ids.insert(id.into());
    }

    pub fn set_nb_result(&mut self, nb: u64) {
        self.nb_result = nb;
    }

    pub fn nb_result(&self) -> u64 {
        self.nb_result
    }

    pub fn current_ids(&self) -> &BTreeSet<String> {
        &self.current_ids
    }

    pub fn is_empty(&self) -> bool {
        self.current_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.current_ids.len()
    }

    pub fn add_final(&mut self, doc: Document) {
        self.finals.get_or_insert_with(Vec::new).push(doc);
    }

    /// Final documents, created empty if none were added
    pub fn get_final(&mut self) -> &Vec<Document> {
        self.finals.get_or_insert_with(Vec::new)
    }

    pub fn finals(&self) -> &[Document] {
        self.finals.as_deref().unwrap_or(&[])
    }

    pub fn is_error(&self) -> bool {
        self.errors.is_some()
    }

    /// Append a diagnostic. Turns the result into the error variant.
    pub fn add_error(mut self, message: impl Into<String>) -> Self {
        self.errors.get_or_insert_with(Vec::new).push(message.into());
        self
    }

    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or(&[])
    }

    /// Convert an error result into `MetaError::EmptyIntermediateResult`
    pub fn into_checked(self) -> MetaResult<QueryResult> {
        if !self.is_error() {
            return Ok(self);
        }
        let rank = self
            .errors()
            .iter()
            .find_map(|e| e.strip_prefix("no_result_at_rank: "))
            .and_then(|r| r.parse().ok())
            .unwrap_or(0);
        Err(MetaError::EmptyIntermediateResult {
            rank,
            diagnostics: self.errors.unwrap_or_default(),
        })
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.current_ids.iter().map(String::as_str).collect();
        write!(f, "{} ids=[{}] nb={}", self.kind, ids.join(", "), self.nb_result)?;
        if let Some(errors) = &self.errors {
            write!(f, " errors=[{}]", errors.join("; "))?;
        }
        Ok(())
    }
}
