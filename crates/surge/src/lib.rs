//! Surge: write-behind batching and circuit breaking for a scaled CRUD service
//!
//! Surge provides the pieces a user service needs once single-row writes
//! and unguarded dependency calls stop keeping up:
//! - **Write queue**: coalesces concurrent writes into periodic bulk inserts
//! - **Circuit breaker**: fails fast against a degraded store or cache
//! - **Registry**: exactly one breaker per named dependency
//! - **Cache-aside**: read-through cache with breaker-guarded fallbacks
//! - **Memory backends**: fault-injectable store and cache for tests and simulation
//!
//! # Quick Start
//!
//! ```no_run
//! use surge::prelude::*;
//! use surge::memory::MemoryStorage;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let registry = BreakerRegistry::default();
//! let queue = WriteQueue::new(
//!     Arc::new(MemoryStorage::new()),
//!     registry.guarded("postgres"),
//!     WriteQueueConfig::default(),
//! )?;
//! let worker = queue.start();
//!
//! let created = queue.submit(WriteRequest::create("Ada", "ada@example.com")).await?;
//! assert!(created.record().is_some());
//! assert_eq!(registry.circuit_state("postgres"), Some(BreakerState::Closed));
//!
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cache_aside;
pub mod circuit_breaker;
pub mod memory;
pub mod prelude;
pub mod registry;
pub mod write_queue;

// Re-export core types
pub use surge_core::{
    clock::{Clock, ManualClock, TokioClock},
    config::{CacheConfig, CircuitBreakerConfig, SurgeConfig, WriteQueueConfig},
    error::{Result, SurgeError},
    traits::{CacheBackend, StorageBackend},
    types::{
        BreakerState, NewUser, OperationKind, UserId, UserPatch, UserRecord, WriteOutcome,
        WriteRequest,
    },
};

// Re-export main types from this crate
pub use cache_aside::CacheAside;
pub use circuit_breaker::{
    BreakerMetrics, BreakerMetricsSnapshot, BreakerStatus, CircuitBreaker, StateChangeHook,
};
pub use memory::{MemoryCache, MemoryStorage};
pub use registry::BreakerRegistry;
pub use write_queue::{
    FlushOutcome, FlushReport, FlushWorker, PendingWrite, WriteQueue, WriteQueueMetrics,
    WriteQueueMetricsSnapshot,
};
