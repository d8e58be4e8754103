//! Simulate command implementation

use anyhow::{Context, Result};
use clap::Args;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge::memory::MemoryStorage;
use surge::prelude::*;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of create requests to submit
    #[arg(short, long, default_value_t = 10_000)]
    requests: usize,

    /// Maximum requests in flight at once
    #[arg(long, default_value_t = 1_000)]
    concurrency: usize,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the configured flush interval (milliseconds)
    #[arg(long)]
    flush_interval_ms: Option<u64>,

    /// Simulated latency of every storage call (milliseconds)
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// Keep the store unavailable for this long after start (milliseconds)
    #[arg(long, default_value_t = 0)]
    outage_ms: u64,
}

#[derive(Debug, Default)]
struct Tally {
    created: usize,
    batch_failures: usize,
    fast_fails: usize,
    other: usize,
}

pub async fn execute(mut config: SurgeConfig, args: SimulateArgs) -> Result<()> {
    if let Some(size) = args.batch_size {
        config.write_queue.batch_size = size;
    }
    if let Some(ms) = args.flush_interval_ms {
        config.write_queue.flush_interval_ms = ms;
    }
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Simulating {} creates (concurrency {}, batch size {}, flush every {}ms)",
        args.requests,
        args.concurrency,
        config.write_queue.batch_size,
        config.write_queue.flush_interval_ms
    );

    let storage = Arc::new(
        MemoryStorage::new().with_latency(Duration::from_millis(args.latency_ms)),
    );
    let registry = BreakerRegistry::new(config.store_breaker.clone()).with_state_change_hook(
        Arc::new(|name: &str, from: BreakerState, to: BreakerState| {
            tracing::info!("Breaker '{}' moved {} -> {}", name, from, to);
        }),
    );
    let breaker = registry.guarded("postgres");
    let queue = WriteQueue::new(storage.clone(), breaker.clone(), config.write_queue.clone())?;

    if args.outage_ms > 0 {
        storage.set_unavailable(true);
        let storage = storage.clone();
        let outage = Duration::from_millis(args.outage_ms);
        tokio::spawn(async move {
            tokio::time::sleep(outage).await;
            storage.set_unavailable(false);
            tracing::info!("Store recovered after {:?}", outage);
        });
    }

    let worker = queue.start();
    let started = Instant::now();

    let tally = stream::iter(0..args.requests)
        .map(|i| {
            let queue = queue.clone();
            async move {
                queue
                    .submit(WriteRequest::create(
                        format!("user-{i}"),
                        format!("user-{i}@example.com"),
                    ))
                    .await
            }
        })
        .buffer_unordered(args.concurrency.max(1))
        .fold(Tally::default(), |mut tally, outcome| async move {
            match outcome {
                Ok(_) => tally.created += 1,
                Err(SurgeError::BatchSubmission { .. }) => tally.batch_failures += 1,
                Err(e) if e.is_circuit_open() => tally.fast_fails += 1,
                Err(_) => tally.other += 1,
            }
            tally
        })
        .await;

    let elapsed = started.elapsed();
    worker.stop().await.context("Failed to stop flush worker")?;

    let queue_metrics = queue.metrics().snapshot();
    let breaker_metrics = breaker.metrics().snapshot();
    let batches = storage.bulk_insert_sizes();

    println!("\nSimulation Summary");
    println!("{}", "=".repeat(60));
    println!("Requests:        {}", args.requests);
    println!("Elapsed:         {:.2?}", elapsed);
    println!(
        "Throughput:      {:.0} req/s",
        args.requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("\nOutcomes:");
    println!("  Created:         {}", tally.created);
    println!("  Batch failures:  {}", tally.batch_failures);
    println!("  Fast-failed:     {}", tally.fast_fails);
    println!("  Other errors:    {}", tally.other);
    println!("\nWrite Queue:");
    println!("  Flushes:         {}", queue_metrics.batches);
    println!("  Bulk inserts:    {}", batches.len());
    if !batches.is_empty() {
        println!(
            "  Avg batch size:  {:.1}",
            batches.iter().sum::<usize>() as f64 / batches.len() as f64
        );
    }
    println!("\nBreaker 'postgres':");
    println!("  Final state:     {}", breaker.state());
    println!("  Opens:           {}", breaker_metrics.opens);
    println!("  Rejections:      {}", breaker_metrics.rejections);
    println!("  Success rate:    {:.1}%", breaker_metrics.success_rate() * 100.0);

    Ok(())
}
