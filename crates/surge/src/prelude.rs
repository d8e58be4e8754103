//! Surge Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use surge::prelude::*;
//! ```

// Core types
pub use crate::{
    BreakerState, NewUser, OperationKind, Result, SurgeError, UserId, UserPatch, UserRecord,
    WriteOutcome, WriteRequest,
};

// Configs
pub use crate::{CacheConfig, CircuitBreakerConfig, SurgeConfig, WriteQueueConfig};

// Traits
pub use crate::{CacheBackend, Clock, StorageBackend};

// Write queue
pub use crate::{FlushOutcome, FlushReport, FlushWorker, PendingWrite, WriteQueue};

// Circuit breaker
pub use crate::{BreakerMetricsSnapshot, BreakerRegistry, CircuitBreaker};

// Reads
pub use crate::CacheAside;

// Re-export common external deps
pub use std::sync::Arc;
pub use tracing;
