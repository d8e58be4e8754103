//! One circuit breaker per logical dependency.

use crate::circuit_breaker::{CircuitBreaker, StateChangeHook};
use dashmap::DashMap;
use std::sync::Arc;
use surge_core::{BreakerState, CircuitBreakerConfig, Clock, TokioClock};

/// Process-wide set of breakers keyed by dependency name
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    hook: Option<StateChangeHook>,
}

impl BreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self::with_clock(default_config, Arc::new(TokioClock))
    }

    pub fn with_clock(default_config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
            clock,
            hook: None,
        }
    }

    /// Install `hook` on every breaker this registry creates from now on.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Breaker guarding `dependency`, created with the default config on first use.
    pub fn guarded(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            return existing.value().clone();
        }
        self.insert(dependency, self.default_config.clone())
    }

    /// Create the breaker for `dependency` with its own config.
    ///
    /// If the dependency already has a breaker, that breaker is returned
    /// unchanged.
    pub fn register(&self, dependency: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.insert(dependency, config)
    }

    /// Current state of the breaker guarding `dependency`, if one exists
    pub fn circuit_state(&self, dependency: &str) -> Option<BreakerState> {
        self.breakers.get(dependency).map(|b| b.value().state())
    }

    /// States of every registered breaker, sorted by name
    pub fn states(&self) -> Vec<(String, BreakerState)> {
        let mut states: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn insert(&self, dependency: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                tracing::debug!("Registering circuit breaker '{}'", dependency);
                let breaker = CircuitBreaker::with_clock(dependency, config, self.clock.clone());
                if let Some(hook) = &self.hook {
                    breaker.on_state_change(hook.clone());
                }
                Arc::new(breaker)
            })
            .value()
            .clone()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
