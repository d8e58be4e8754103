pub mod breaker;
pub mod cache;
pub mod write_queue;

pub use breaker::CircuitBreakerConfig;
pub use cache::CacheConfig;
pub use write_queue::WriteQueueConfig;

use crate::error::{Result, SurgeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the write path and its guarded dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeConfig {
    #[serde(default)]
    pub write_queue: WriteQueueConfig,

    /// Breaker guarding the relational store
    #[serde(default)]
    pub store_breaker: CircuitBreakerConfig,

    /// Breaker guarding the cache
    #[serde(default = "default_cache_breaker")]
    pub cache_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_cache_breaker() -> CircuitBreakerConfig {
    // A cache miss is cheap, so give up on a sick cache sooner and retry it sooner.
    CircuitBreakerConfig::default()
        .with_failure_threshold(3)
        .with_open_duration_ms(5_000)
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            write_queue: WriteQueueConfig::default(),
            store_breaker: CircuitBreakerConfig::default(),
            cache_breaker: default_cache_breaker(),
            cache: CacheConfig::default(),
        }
    }
}

impl SurgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SurgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SurgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.write_queue.validate()?;
        self.store_breaker.validate()?;
        self.cache_breaker.validate()?;
        Ok(())
    }
}
