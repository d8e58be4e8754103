//! In-memory storage and cache backends
//!
//! Used by the simulator and tests. Both support fault injection so the
//! breaker and batch-failure paths can be exercised without a real
//! database or cache cluster.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_core::{
    CacheBackend, Clock, NewUser, Result, StorageBackend, SurgeError, TokioClock, UserId,
    UserPatch, UserRecord,
};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Faults {
    /// Fail this many upcoming calls, then recover
    fail_next: u32,
    /// Fail every call until cleared
    unavailable: bool,
}

impl Faults {
    fn check(&mut self, what: &str) -> std::result::Result<(), String> {
        if self.unavailable {
            return Err(format!("{what}: connection refused"));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(format!("{what}: injected failure"));
        }
        Ok(())
    }
}

/// User table held in a `BTreeMap`, with a unique index on email
pub struct MemoryStorage {
    rows: Mutex<BTreeMap<UserId, UserRecord>>,
    next_id: AtomicU64,
    faults: Mutex<Faults>,
    bulk_insert_sizes: Mutex<Vec<usize>>,
    latency: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            faults: Mutex::new(Faults::default()),
            bulk_insert_sizes: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Delay every call by `latency` (tokio time)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: u32) {
        self.faults.lock().fail_next = n;
    }

    /// Fail every call while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Row counts of every `bulk_insert` call that reached this backend, in call order
    pub fn bulk_insert_sizes(&self) -> Vec<usize> {
        self.bulk_insert_sizes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// All rows ordered by id
    pub fn rows(&self) -> Vec<UserRecord> {
        self.rows.lock().values().cloned().collect()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_fault(&self, what: &str) -> Result<()> {
        self.faults.lock().check(what).map_err(SurgeError::Storage)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn duplicate_email(email: &str) -> SurgeError {
    SurgeError::Storage(format!(
        "duplicate key value violates unique constraint \"users_email_key\": {email}"
    ))
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn bulk_insert(&self, rows: Vec<NewUser>) -> Result<Vec<UserRecord>> {
        self.simulate_latency().await;
        self.bulk_insert_sizes.lock().push(rows.len());
        self.check_fault("bulk_insert")?;

        let mut table = self.rows.lock();

        // All-or-nothing: check every constraint before touching the table.
        let mut seen: HashSet<&str> = table.values().map(|r| r.email.as_str()).collect();
        for row in &rows {
            if !seen.insert(row.email.as_str()) {
                return Err(duplicate_email(&row.email));
            }
        }
        drop(seen);

        let now = Utc::now();
        let inserted: Vec<UserRecord> = rows
            .into_iter()
            .map(|row| UserRecord {
                id: UserId(self.next_id.fetch_add(1, Ordering::SeqCst)),
                name: row.name,
                email: row.email,
                created_at: now,
                updated_at: now,
            })
            .collect();

        for record in &inserted {
            table.insert(record.id, record.clone());
        }
        Ok(inserted)
    }

    async fn update(&self, id: UserId, patch: UserPatch) -> Result<Option<UserRecord>> {
        self.simulate_latency().await;
        self.check_fault("update")?;

        let mut table = self.rows.lock();
        if let Some(email) = &patch.email {
            if table.values().any(|r| r.id != id && &r.email == email) {
                return Err(duplicate_email(email));
            }
        }

        Ok(table.get_mut(&id).map(|record| {
            patch.apply_to(record, Utc::now());
            record.clone()
        }))
    }

    async fn delete(&self, id: UserId) -> Result<bool> {
        self.simulate_latency().await;
        self.check_fault("delete")?;
        Ok(self.rows.lock().remove(&id).is_some())
    }

    async fn get(&self, id: UserId) -> Result<Option<UserRecord>> {
        self.simulate_latency().await;
        self.check_fault("get")?;
        Ok(self.rows.lock().get(&id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Cache counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
}

/// Key/value cache with per-entry TTL measured on an injected clock
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    clock: Arc<dyn Clock>,
    faults: Mutex<Faults>,
    stats: CacheStats,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            faults: Mutex::new(Faults::default()),
            stats: CacheStats::default(),
        }
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: u32) {
        self.faults.lock().fail_next = n;
    }

    /// Fail every call while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Read an entry without counting it or honouring injected faults
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries
            .lock()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone())
    }

    fn check_fault(&self, what: &str) -> Result<()> {
        self.faults.lock().check(what).map_err(SurgeError::Cache)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        self.check_fault("get")?;

        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let lookup = entries
            .get(key)
            .map(|(value, expires_at)| (*expires_at > now).then(|| value.clone()));
        match lookup {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        self.check_fault("set")?;

        let expires_at = self.clock.now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_fault("delete")?;
        self.entries.lock().remove(key);
        Ok(())
    }
}
