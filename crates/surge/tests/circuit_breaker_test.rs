//! Circuit breaker state machine tests driven by tokio's paused clock

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge::prelude::*;

fn scenario_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "postgres",
        CircuitBreakerConfig::default()
            .with_failure_threshold(3)
            .with_open_duration_ms(1_000)
            .with_success_threshold(2),
    )
}

async fn counted_call(breaker: &CircuitBreaker, calls: &AtomicU32, ok: bool) -> Result<()> {
    breaker
        .call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            if ok {
                Ok(())
            } else {
                Err(SurgeError::Storage("connection reset".to_string()))
            }
        })
        .await
}

/// Threshold 3, open for 1000ms: three failures open the circuit, calls in
/// the next 999ms never reach the dependency, a call at 1001ms does.
#[tokio::test(start_paused = true)]
async fn test_open_window_scenario() {
    let breaker = scenario_breaker();
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
        let err = counted_call(&breaker, &calls, false).await.unwrap_err();
        assert!(!err.is_circuit_open());
    }
    assert_eq!(breaker.state(), BreakerState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    for _ in 0..9 {
        tokio::time::advance(Duration::from_millis(111)).await;
        let err = counted_call(&breaker, &calls, true).await.unwrap_err();
        assert!(err.is_circuit_open());
    }
    // 999ms elapsed
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_millis(2)).await;
    counted_call(&breaker, &calls, true).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_closes_after_success_threshold() {
    let breaker = scenario_breaker();
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
        let _ = counted_call(&breaker, &calls, false).await;
    }
    tokio::time::advance(Duration::from_millis(1_001)).await;

    counted_call(&breaker, &calls, true).await.unwrap();
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    counted_call(&breaker, &calls, true).await.unwrap();
    assert_eq!(breaker.state(), BreakerState::Closed);

    let status = breaker.status();
    assert_eq!(status.failure_count, 0);
    assert_eq!(status.half_open_successes, 0);

    // Closed again: it takes a full threshold of failures to reopen.
    let _ = counted_call(&breaker, &calls, false).await;
    let _ = counted_call(&breaker, &calls, false).await;
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let breaker = scenario_breaker();
    let calls = AtomicU32::new(0);

    for _ in 0..3 {
        let _ = counted_call(&breaker, &calls, false).await;
    }
    tokio::time::advance(Duration::from_millis(1_001)).await;

    counted_call(&breaker, &calls, true).await.unwrap();
    let err = counted_call(&breaker, &calls, false).await.unwrap_err();
    assert!(matches!(err, SurgeError::Storage(_)));
    assert_eq!(breaker.state(), BreakerState::Open);

    let before = calls.load(Ordering::SeqCst);
    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(counted_call(&breaker, &calls, true)
        .await
        .unwrap_err()
        .is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), before);

    // The earlier half-open success does not carry over.
    tokio::time::advance(Duration::from_millis(2)).await;
    counted_call(&breaker, &calls, true).await.unwrap();
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_while_open_skips_guarded_call() {
    let breaker = scenario_breaker();
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        let _ = counted_call(&breaker, &calls, false).await;
    }

    let value = breaker
        .call_with_fallback(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SurgeError>("live")
            },
            |err| async move {
                assert!(err.is_circuit_open());
                Ok::<_, SurgeError>("stale")
            },
        )
        .await
        .unwrap();

    assert_eq!(value, "stale");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let metrics = breaker.metrics().snapshot();
    assert_eq!(metrics.fallbacks, 1);
    assert_eq!(metrics.rejections, 1);
    assert_eq!(metrics.failures, 3);
}

#[tokio::test]
async fn test_fallback_outcome_is_not_counted() {
    let breaker = scenario_breaker();

    // Guarded call fails, fallback also fails: one failure recorded.
    let err = breaker
        .call_with_fallback(
            || async { Err::<u32, _>(SurgeError::Cache("timeout".to_string())) },
            |_| async { Err::<u32, _>(SurgeError::Storage("fallback broke".to_string())) },
        )
        .await
        .unwrap_err();
    assert_eq!(err, SurgeError::Storage("fallback broke".to_string()));
    assert_eq!(breaker.status().failure_count, 1);

    // Guarded call fails, fallback succeeds: still counted as a failure.
    let value = breaker
        .call_with_fallback(
            || async { Err::<u32, _>(SurgeError::Cache("timeout".to_string())) },
            |_| async { Ok::<_, SurgeError>(7) },
        )
        .await
        .unwrap();
    assert_eq!(value, 7);
    assert_eq!(breaker.status().failure_count, 2);

    let metrics = breaker.metrics().snapshot();
    assert_eq!(metrics.failures, 2);
    assert_eq!(metrics.successes, 0);
    assert_eq!(metrics.fallbacks, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_once() {
    let breaker = Arc::new(
        CircuitBreaker::new(
            "redis",
            CircuitBreakerConfig::default()
                .with_failure_threshold(3)
                .with_open_duration_ms(60_000),
        ),
    );

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async {
                        tokio::task::yield_now().await;
                        Err::<(), _>(SurgeError::Cache("down".to_string()))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_err());
    }

    assert_eq!(breaker.state(), BreakerState::Open);
    let metrics = breaker.metrics().snapshot();
    assert_eq!(metrics.opens, 1);
    assert_eq!(metrics.failures + metrics.rejections, 32);
}

#[tokio::test]
async fn test_registry_guards_each_dependency_separately() {
    let registry = BreakerRegistry::new(
        CircuitBreakerConfig::default().with_failure_threshold(1),
    );

    let _ = registry
        .guarded("redis")
        .call(|| async { Err::<(), _>(SurgeError::Cache("down".to_string())) })
        .await;
    registry
        .guarded("postgres")
        .call(|| async { Ok::<_, SurgeError>(()) })
        .await
        .unwrap();

    assert_eq!(registry.circuit_state("redis"), Some(BreakerState::Open));
    assert_eq!(registry.circuit_state("postgres"), Some(BreakerState::Closed));
}
