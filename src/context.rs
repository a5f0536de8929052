//! Engine context
//!
//! Owns the document store, the node cache and the configuration. Passed
//! explicitly to every node and executor call.

use crate::config::EngineConfig;
use crate::error::MetaResult;
use crate::memory_store::MemoryStore;
use crate::node_cache::NodeCache;
use crate::storage::DocumentStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn DocumentStore>,
    pub cache: NodeCache,
    pub config: EngineConfig,
}

impl EngineContext {
    /// Create a context over `store`, validating `config`
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> MetaResult<Self> {
        config.validate()?;
        let cache = NodeCache::new(config.cache_capacity, config.cache_ttl());
        Ok(EngineContext {
            store,
            cache,
            config,
        })
    }

    /// Default configuration over a fresh `MemoryStore`
    pub fn in_memory() -> Self {
        let config = EngineConfig::default();
        EngineContext {
            store: Arc::new(MemoryStore::new()),
            cache: NodeCache::new(config.cache_capacity, config.cache_ttl()),
            config,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}
