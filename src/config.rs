//! Engine configuration
//!
//! Loaded from JSON. Missing keys fall back to defaults, unknown keys are rejected.

use crate::error::{MetaError, MetaResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the metadata engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of Unit snapshots kept in the node cache
    pub cache_capacity: u64,
    /// Idle time (in seconds) after which a cached snapshot expires
    pub cache_ttl_secs: u64,
    /// Deepest level a Unit may reach in the hierarchy
    pub max_depth: u32,
    /// Trace every step request and result at info level
    pub print_request: bool,
    /// Trace the accumulator after each rank
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_capacity: 100_000,
            cache_ttl_secs: 300,
            max_depth: 100,
            print_request: false,
            debug: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(text: &str) -> MetaResult<Self> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| MetaError::Config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> MetaResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MetaError::Config(format!(
                "cannot read engine config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> MetaResult<()> {
        if self.cache_capacity == 0 {
            return Err(MetaError::Config("cache_capacity must be > 0".to_string()));
        }
        if self.cache_ttl_secs == 0 {
            return Err(MetaError::Config("cache_ttl_secs must be > 0".to_string()));
        }
        if self.max_depth == 0 {
            return Err(MetaError::Config("max_depth must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, 100);
        assert!(config.debug);
        assert!(!config.print_request);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{"max_depth": 12}"#).unwrap();
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.cache_capacity, 100_000);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineConfig::from_json_str(r#"{"max_deep": 12}"#).unwrap_err();
        assert!(matches!(err, MetaError::Config(_)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = EngineConfig::from_json_str(r#"{"cache_ttl_secs": 0}"#).unwrap_err();
        assert!(matches!(err, MetaError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        match err {
            MetaError::Config(msg) => assert!(msg.contains("absent.json"), "{}", msg),
            other => panic!("expected a config error, got {:?}", other),
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cache_capacity": 10, "print_request": true}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache_capacity, 10);
        assert!(config.print_request);
    }
}
