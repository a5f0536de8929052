//! Archive Meta - hierarchical archival metadata engine
//!
//! Keeps a DAG of archival Units (with attached ObjectGroups) on top of a
//! generic document store, and answers depth-aware requests over it.
//!
//! # Architecture
//!
//! - Store Layer: `DocumentStore` trait, `MemoryStore` reference backend
//! - Node Layer: `Unit` / `ObjectGroup` with denormalized ancestor closure
//! - Link Layer: relation table and diff-based link persistence
//! - Cache Layer: moka-backed Unit snapshot cache for the write path
//! - Execution Layer: step pipeline over a `RequestPlan`

pub mod types;
pub mod error;
pub mod config;
pub mod logging;

// Store layer
pub mod filter;
pub mod update;
pub mod storage;
pub mod memory_store;

// Node layer
pub mod node;
pub mod relation;
pub mod link_update;
pub mod unit;
pub mod object_group;

// Execution layer
pub mod node_cache;
pub mod context;
pub mod result;
pub mod plan;
pub mod roots;
pub mod executor;

pub use types::{Collection, DepthMap, Document, NodeKind};
pub use error::{MetaError, MetaResult, StoreError, StoreResult};
pub use config::EngineConfig;
pub use logging::init_tracing;

pub use filter::{Filter, FindOptions, Projection, SortDirection, SortField};
pub use update::UpdateDoc;
pub use storage::{AggregateStage, DocumentStore, UpdateOutcome};
pub use memory_store::{MemoryStore, StoreStats};

pub use node::GraphNode;
pub use relation::{Relation, RelationKind};
pub use unit::Unit;
pub use object_group::ObjectGroup;

pub use node_cache::NodeCache;
pub use context::EngineContext;
pub use result::QueryResult;
pub use plan::{insert_document, DepthMode, PlanOperation, RequestPlan, StepQuery};
pub use roots::RootResolver;
pub use executor::QueryExecutor;
