//! Surge Core: shared types and seams for the surge write path
//!
//! This crate defines what the batching queue and circuit breaker are built
//! against:
//! - Domain types: user records, write requests and their outcomes
//! - Backend traits: the relational store and the cache, both external
//! - Configuration: queue, breaker and cache settings with serde defaults
//! - Clock: injectable time source so breaker timing is testable
//! - Observe: optional `metrics` instrumentation

pub mod clock;
pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{CacheConfig, CircuitBreakerConfig, SurgeConfig, WriteQueueConfig};
pub use error::{Result, SurgeError};
pub use traits::{CacheBackend, StorageBackend};
pub use types::{
    BreakerState, NewUser, OperationKind, UserId, UserPatch, UserRecord, WriteOutcome,
    WriteRequest,
};
