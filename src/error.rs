//! Error types
//!
//! `StoreError` is raised at the document-store boundary, `MetaError` by the
//! engine itself. Store failures convert into `MetaError::StoreExecutionFailure`.

use thiserror::Error;

/// Failure reported by a `DocumentStore` implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key {id} in collection {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Engine error taxonomy
#[derive(Debug, Error)]
pub enum MetaError {
    /// A pipeline step produced no matches
    #[error("no result at rank {rank}: {}", diagnostics.join("; "))]
    EmptyIntermediateResult { rank: usize, diagnostics: Vec<String> },

    /// The node kind cannot perform the requested operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The underlying store call failed
    #[error("store execution failure: {0}")]
    StoreExecutionFailure(#[from] StoreError),

    /// The request plan is structurally invalid
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// Linking would push a node past the configured depth limit
    #[error("max depth exceeded for {id}: {depth} > {max}")]
    MaxDepthExceeded { id: String, depth: u32, max: u32 },

    /// A stored document does not decode into a node
    #[error("invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },
    /// Engine configuration could not be read or is out of range
    #[error("configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type MetaResult<T> = Result<T, MetaError>;
