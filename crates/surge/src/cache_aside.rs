//! Cache-aside reads
//!
//! Look in the cache first, fall back to the store on a miss, then
//! populate the cache. Each dependency sits behind its own breaker: a sick
//! cache degrades to store reads, a sick store fails fast.

use crate::circuit_breaker::CircuitBreaker;
use std::sync::Arc;
use surge_core::observe;
use surge_core::{
    CacheBackend, CacheConfig, Result, StorageBackend, SurgeError, UserId, UserRecord,
};

/// Read-through view of user rows
pub struct CacheAside {
    storage: Arc<dyn StorageBackend>,
    cache: Arc<dyn CacheBackend>,
    store_breaker: Arc<CircuitBreaker>,
    cache_breaker: Arc<CircuitBreaker>,
    config: CacheConfig,
}

impl CacheAside {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        cache: Arc<dyn CacheBackend>,
        store_breaker: Arc<CircuitBreaker>,
        cache_breaker: Arc<CircuitBreaker>,
        config: CacheConfig,
    ) -> Self {
        Self {
            storage,
            cache,
            store_breaker,
            cache_breaker,
            config,
        }
    }

    /// Cache key for a user id
    pub fn key(&self, id: UserId) -> String {
        format!("{}{}", self.config.key_prefix, id)
    }

    /// Fetch a user, serving from cache when possible.
    ///
    /// Cache failures and open cache circuits are treated as misses. Store
    /// failures propagate, including [`SurgeError::CircuitOpen`].
    pub async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        let key = self.key(id);
        let cache = &self.cache;

        let cached = self
            .cache_breaker
            .call_with_fallback(
                || cache.get(&key),
                |err| async move {
                    tracing::debug!("Cache lookup degraded to miss: {}", err);
                    Ok::<_, SurgeError>(None)
                },
            )
            .await?;

        if let Some(raw) = cached {
            match serde_json::from_str::<UserRecord>(&raw) {
                Ok(record) => {
                    observe::record_cache_lookup(true);
                    return Ok(Some(record));
                }
                Err(e) => {
                    tracing::warn!("Discarding undecodable cache entry '{}': {}", key, e);
                }
            }
        }
        observe::record_cache_lookup(false);

        let storage = &self.storage;
        let record = self.store_breaker.call(|| storage.get(id)).await?;

        if let Some(record) = &record {
            self.populate(&key, record).await;
        }
        Ok(record)
    }

    /// Drop the cached copy of a user, e.g. after an update or delete.
    pub async fn invalidate(&self, id: UserId) -> Result<()> {
        let key = self.key(id);
        let cache = &self.cache;
        self.cache_breaker.call(|| cache.delete(&key)).await
    }

    async fn populate(&self, key: &str, record: &UserRecord) {
        let value = match serde_json::to_string(record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to encode user {} for cache: {}", record.id, e);
                return;
            }
        };

        let cache = &self.cache;
        let ttl = self.config.ttl_secs;
        if let Err(e) = self
            .cache_breaker
            .call(|| cache.set(key, value, ttl))
            .await
        {
            tracing::warn!("Failed to populate cache entry '{}': {}", key, e);
        }
    }
}
