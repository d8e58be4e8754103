//! Optional metrics instrumentation for Surge.
//!
//! When the `observe` feature is enabled, the write queue, circuit breakers
//! and cache-aside reader emit counters, histograms and gauges via the
//! [`metrics`] crate. A downstream application must install a metrics
//! recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a completed flush.
///
/// - `surge.write_queue.flushes_total` – counter with `outcome` label
/// - `surge.write_queue.batch_size` – histogram of drained intents
/// - `surge.write_queue.flush_duration_seconds` – histogram
#[inline]
pub fn record_flush(duration: std::time::Duration, drained: usize, failed: usize) {
    #[cfg(feature = "observe")]
    {
        let outcome = if failed == 0 { "ok" } else { "partial_fail" };
        metrics::counter!("surge.write_queue.flushes_total", "outcome" => outcome).increment(1);
        metrics::histogram!("surge.write_queue.batch_size").record(drained as f64);
        metrics::histogram!("surge.write_queue.flush_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, drained, failed);
    }
}

/// Set the current pending-intent gauge.
///
/// - `surge.write_queue.pending` – gauge
#[inline]
pub fn set_pending(len: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("surge.write_queue.pending").set(len as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = len;
    }
}

/// Record a breaker state transition.
///
/// - `surge.breaker.transitions_total` – counter with `dependency` and `to` labels
#[inline]
pub fn record_breaker_transition(dependency: &str, to: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!(
            "surge.breaker.transitions_total",
            "dependency" => dependency.to_string(),
            "to" => to
        )
        .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (dependency, to);
    }
}

/// Record a call rejected by an open circuit.
///
/// - `surge.breaker.rejections_total` – counter with `dependency` label
#[inline]
pub fn record_breaker_rejection(dependency: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("surge.breaker.rejections_total", "dependency" => dependency.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = dependency;
    }
}

/// Record a cache-aside lookup.
///
/// - `surge.cache.lookups_total` – counter with `result` label (`hit` / `miss`)
#[inline]
pub fn record_cache_lookup(hit: bool) {
    #[cfg(feature = "observe")]
    {
        let result = if hit { "hit" } else { "miss" };
        metrics::counter!("surge.cache.lookups_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = hit;
    }
}
