//! Circuit Breaker Pattern
//!
//! Bounds the cost of calling a degraded dependency: after enough
//! consecutive failures the circuit opens and calls fail fast (or go to a
//! fallback) without touching the dependency. Once the open window has
//! passed, calls are let through as probes; enough consecutive probe
//! successes close the circuit again, a single probe failure reopens it.
//!
//! # Example
//!
//! ```no_run
//! use surge::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = CircuitBreakerConfig::default()
//!     .with_failure_threshold(3)
//!     .with_open_duration_ms(1_000);
//!
//! let breaker = Arc::new(CircuitBreaker::new("postgres", config));
//!
//! let rows = breaker
//!     .call_with_fallback(
//!         || async { Ok::<_, SurgeError>(vec![1, 2, 3]) },
//!         |_err| async { Ok::<_, SurgeError>(Vec::new()) },
//!     )
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use surge_core::observe;
use surge_core::{BreakerState, CircuitBreakerConfig, Clock, Result, SurgeError, TokioClock};
use tokio::time::Instant;

/// Callback fired after every state transition with `(name, from, to)`.
pub type StateChangeHook = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

/// Internal state for circuit breaker
struct BreakerInternalState {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    half_open_successes: u32,
}

impl BreakerInternalState {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure_at: None,
            half_open_successes: 0,
        }
    }
}

type Transition = (BreakerState, BreakerState);

/// Circuit breaker metrics
#[derive(Debug, Default)]
pub struct BreakerMetrics {
    /// Guarded calls that succeeded
    pub successes: AtomicU64,

    /// Guarded calls that failed
    pub failures: AtomicU64,

    /// Calls rejected without invoking the guarded function
    pub rejections: AtomicU64,

    /// Calls answered by a fallback
    pub fallbacks: AtomicU64,

    /// Number of times circuit opened
    pub opens: AtomicU64,

    /// Number of times circuit closed
    pub closes: AtomicU64,
}

impl BreakerMetrics {
    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of metrics
    pub fn snapshot(&self) -> BreakerMetricsSnapshot {
        BreakerMetricsSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of circuit breaker metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerMetricsSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
    pub fallbacks: u64,
    pub opens: u64,
    pub closes: u64,
}

impl BreakerMetricsSnapshot {
    /// Get success rate of guarded calls (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            1.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// Get rejection rate (relative to total attempts)
    pub fn rejection_rate(&self) -> f64 {
        let total = self.successes + self.failures + self.rejections;
        if total == 0 {
            0.0
        } else {
            self.rejections as f64 / total as f64
        }
    }
}

/// Point-in-time view of a breaker's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    pub state: BreakerState,
    pub failure_count: u32,
    pub half_open_successes: u32,
}

/// Circuit breaker guarding one logical dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerInternalState>,
    metrics: Arc<BreakerMetrics>,
    hook: RwLock<Option<StateChangeHook>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker on the tokio clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(TokioClock))
    }

    /// Create a new circuit breaker with an explicit time source
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: Mutex::new(BreakerInternalState::new()),
            metrics: Arc::new(BreakerMetrics::default()),
            hook: RwLock::new(None),
        }
    }

    /// Get the breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current state.
    ///
    /// An expired Open circuit still reports Open here; the move to
    /// HalfOpen happens when the next call is admitted.
    pub fn state(&self) -> BreakerState {
        self.state.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let state = self.state.lock();
        BreakerStatus {
            state: state.state,
            failure_count: state.failure_count,
            half_open_successes: state.half_open_successes,
        }
    }

    /// Get metrics
    pub fn metrics(&self) -> &Arc<BreakerMetrics> {
        &self.metrics
    }

    /// Install a hook that observes every state transition.
    ///
    /// The hook runs after the state lock is released.
    pub fn on_state_change(&self, hook: StateChangeHook) {
        *self.hook.write() = Some(hook);
    }

    /// Execute `f` through the circuit breaker.
    ///
    /// Returns [`SurgeError::CircuitOpen`] without calling `f` while the
    /// circuit is open. Otherwise returns `f`'s result and records its
    /// outcome.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Execute `f` through the circuit breaker, answering with `fallback`
    /// when the circuit is open or `f` fails.
    ///
    /// The fallback receives the error it replaces. Its own outcome is
    /// never counted against the circuit.
    pub async fn call_with_fallback<F, Fut, FB, FbFut, T>(&self, f: F, fallback: FB) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        FB: FnOnce(SurgeError) -> FbFut,
        FbFut: Future<Output = Result<T>>,
    {
        match self.call(f).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!("Circuit breaker '{}': using fallback ({})", self.name, e);
                self.metrics.record_fallback();
                fallback(e).await
            }
        }
    }

    /// Manually reset the circuit breaker to closed state
    pub fn reset(&self) {
        let transition = {
            let mut state = self.state.lock();
            tracing::info!(
                "Circuit breaker '{}': manually reset to closed state",
                self.name
            );
            state.failure_count = 0;
            state.half_open_successes = 0;
            state.last_failure_at = None;
            self.transition(&mut state, BreakerState::Closed)
        };
        self.notify(transition);
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen once the
    /// open window has passed.
    fn admit(&self) -> Result<()> {
        let transition = {
            let mut state = self.state.lock();
            match state.state {
                BreakerState::Closed | BreakerState::HalfOpen => None,
                BreakerState::Open => {
                    let expired = state.last_failure_at.is_none_or(|at| {
                        self.clock.now().duration_since(at) > self.config.open_duration()
                    });
                    if !expired {
                        drop(state);
                        self.metrics.record_rejection();
                        observe::record_breaker_rejection(&self.name);
                        return Err(SurgeError::CircuitOpen {
                            dependency: self.name.clone(),
                        });
                    }

                    tracing::info!(
                        "Circuit breaker '{}': transitioning to half-open",
                        self.name
                    );
                    state.half_open_successes = 0;
                    self.transition(&mut state, BreakerState::HalfOpen)
                }
            }
        };
        self.notify(transition);
        Ok(())
    }

    fn on_success(&self) {
        self.metrics.record_success();

        let transition = {
            let mut state = self.state.lock();
            match state.state {
                BreakerState::Closed => {
                    state.failure_count = 0;
                    None
                }
                BreakerState::HalfOpen => {
                    state.half_open_successes += 1;
                    if state.half_open_successes >= self.config.success_threshold {
                        tracing::info!(
                            "Circuit breaker '{}': closing circuit after {} successful requests",
                            self.name,
                            state.half_open_successes
                        );
                        state.failure_count = 0;
                        state.half_open_successes = 0;
                        self.transition(&mut state, BreakerState::Closed)
                    } else {
                        None
                    }
                }
                // A call admitted before the circuit opened finished late.
                BreakerState::Open => None,
            }
        };
        self.notify(transition);
    }

    fn on_failure(&self) {
        self.metrics.record_failure();

        let transition = {
            let mut state = self.state.lock();
            let now = self.clock.now();
            match state.state {
                BreakerState::Closed => {
                    state.failure_count += 1;
                    state.last_failure_at = Some(now);
                    if state.failure_count >= self.config.failure_threshold {
                        tracing::warn!(
                            "Circuit breaker '{}': opening circuit ({} consecutive failures)",
                            self.name,
                            state.failure_count
                        );
                        self.transition(&mut state, BreakerState::Open)
                    } else {
                        None
                    }
                }
                BreakerState::HalfOpen => {
                    tracing::warn!(
                        "Circuit breaker '{}': reopening circuit after failure in half-open state",
                        self.name
                    );
                    state.half_open_successes = 0;
                    state.last_failure_at = Some(now);
                    self.transition(&mut state, BreakerState::Open)
                }
                BreakerState::Open => {
                    state.last_failure_at = Some(now);
                    None
                }
            }
        };
        self.notify(transition);
    }

    fn transition(
        &self,
        state: &mut BreakerInternalState,
        to: BreakerState,
    ) -> Option<Transition> {
        let from = state.state;
        if from == to {
            return None;
        }
        state.state = to;
        match to {
            BreakerState::Open => self.metrics.record_open(),
            BreakerState::Closed => self.metrics.record_close(),
            BreakerState::HalfOpen => {}
        }
        observe::record_breaker_transition(&self.name, to.as_str());
        Some((from, to))
    }

    fn notify(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            let hook = self.hook.read().clone();
            if let Some(hook) = hook {
                hook(&self.name, from, to);
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
