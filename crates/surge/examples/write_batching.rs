//! Example demonstrating write-behind batching
//!
//! Many concurrent creates are coalesced into a handful of bulk inserts.

use std::time::Instant;
use surge::memory::MemoryStorage;
use surge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let storage = Arc::new(MemoryStorage::new());
    let registry = BreakerRegistry::default();
    let queue = WriteQueue::new(
        storage.clone(),
        registry.guarded("postgres"),
        WriteQueueConfig::default()
            .with_batch_size(100)
            .with_flush_interval_ms(50),
    )?;
    let worker = queue.start();

    let start = Instant::now();
    let tasks: Vec<_> = (0..1_000)
        .map(|i| {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .submit(WriteRequest::create(
                        format!("user-{i}"),
                        format!("user-{i}@example.com"),
                    ))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if let Ok(Ok(_)) = task.await {
            created += 1;
        }
    }
    worker.stop().await?;

    println!("Created {} users in {:?}", created, start.elapsed());
    println!(
        "Bulk inserts: {} (sizes {:?})",
        storage.bulk_insert_sizes().len(),
        storage.bulk_insert_sizes()
    );
    println!("Breaker state: {:?}", registry.states());

    Ok(())
}
