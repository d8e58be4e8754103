use serde::{Deserialize, Serialize};

/// Configuration for cache-aside reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for populated entries (seconds)
    /// Default: 60
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Prefix prepended to the user id to form the cache key
    /// Default: "user:"
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "user:".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl_secs(mut self, ttl: u64) -> Self {
        self.ttl_secs = ttl;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}
