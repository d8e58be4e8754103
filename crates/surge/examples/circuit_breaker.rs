//! Example: Circuit Breaker Pattern
//!
//! A flaky store fails often enough to open the circuit; calls then fail
//! fast until the open window passes and probes close it again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use surge::prelude::*;

// Simulated store that fails while `healthy` is false
struct FlakyStore {
    calls: AtomicU32,
    healthy: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    async fn query(&self) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(format!("row {}", n))
        } else {
            Err(SurgeError::Storage(format!("query {} timed out", n)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let store = Arc::new(FlakyStore {
        calls: AtomicU32::new(0),
        healthy: std::sync::atomic::AtomicBool::new(false),
    });

    let breaker = CircuitBreaker::new(
        "postgres",
        CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_open_duration_ms(1_000)
            .with_success_threshold(2),
    );

    tracing::info!("=== Phase 1: store is down ===");
    for i in 0..6 {
        match breaker.call(|| store.query()).await {
            Ok(row) => tracing::info!("Call {}: {}", i + 1, row),
            Err(e) if e.is_circuit_open() => tracing::warn!("Call {}: fast-failed", i + 1),
            Err(e) => tracing::warn!("Call {}: {}", i + 1, e),
        }
    }
    tracing::info!(
        "State {}, store saw {} calls",
        breaker.state(),
        store.calls.load(Ordering::SeqCst)
    );

    tracing::info!("=== Phase 2: fallback while open ===");
    let answer = breaker
        .call_with_fallback(
            || store.query(),
            |_| async { Ok::<_, SurgeError>("cached row".to_string()) },
        )
        .await?;
    tracing::info!("Answered with: {}", answer);

    tracing::info!("=== Phase 3: store recovers ===");
    store.healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    for i in 0..3 {
        let row = breaker.call(|| store.query()).await?;
        tracing::info!("Probe {}: {} (state {})", i + 1, row, breaker.state());
    }

    let metrics = breaker.metrics().snapshot();
    tracing::info!("=== Final Statistics ===");
    tracing::info!("Successes: {}", metrics.successes);
    tracing::info!("Failures: {}", metrics.failures);
    tracing::info!("Rejections: {}", metrics.rejections);
    tracing::info!("Fallbacks: {}", metrics.fallbacks);
    tracing::info!("Times opened: {}", metrics.opens);
    tracing::info!("Times closed: {}", metrics.closes);

    Ok(())
}
