//! Write-behind batching queue
//!
//! Request handlers enqueue write intents and await a [`PendingWrite`].
//! A single timer-driven flush drains up to `batch_size` intents from the
//! head of the queue, submits every create in the batch as one bulk insert
//! through the store's circuit breaker, and resolves each waiter with the
//! row at its position in the backend's output.
//!
//! ```text
//! enqueue ──┐
//! enqueue ──┼──> pending (FIFO) ──flush every 50ms──> bulk_insert ──> resolve by position
//! enqueue ──┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use surge::prelude::*;
//! use surge::memory::MemoryStorage;
//!
//! # async fn example() -> Result<()> {
//! let storage = Arc::new(MemoryStorage::new());
//! let breaker = Arc::new(CircuitBreaker::new("postgres", CircuitBreakerConfig::default()));
//! let queue = WriteQueue::new(storage, breaker, WriteQueueConfig::default())?;
//! let worker = queue.start();
//!
//! let outcome = queue.submit(WriteRequest::create("Ada", "ada@example.com")).await?;
//! println!("created {:?}", outcome.record());
//!
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use crate::circuit_breaker::CircuitBreaker;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use surge_core::observe;
use surge_core::{
    NewUser, OperationKind, Result, StorageBackend, SurgeError, UserId, UserPatch, WriteOutcome,
    WriteQueueConfig, WriteRequest,
};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

type Completion = oneshot::Sender<Result<WriteOutcome>>;

/// A queued write and the slot its caller is waiting on.
struct WriteIntent {
    request: WriteRequest,
    submitted_at: Instant,
    completion: Completion,
}

/// Writes applied one row at a time after the batch's bulk insert
enum SingleWrite {
    Update { id: UserId, patch: UserPatch },
    Delete { id: UserId },
}

struct PendingQueue {
    intents: VecDeque<WriteIntent>,
    closed: bool,
}

/// Handle to an enqueued write.
///
/// Resolves exactly once, with the intent's row or the failure of the
/// batch it was drained into. Resolves with [`SurgeError::QueueClosed`] if
/// the queue is dropped first.
#[must_use = "a PendingWrite does nothing unless awaited"]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<WriteOutcome>>,
}

impl Future for PendingWrite {
    type Output = Result<WriteOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SurgeError::QueueClosed)))
    }
}

/// Result of one call to [`WriteQueue::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was running; nothing was drained.
    InProgress,
    /// Nothing was pending.
    Empty,
    Flushed(FlushReport),
}

/// Per-flush accounting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Intents removed from the queue by this flush
    pub drained: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Intents resolved with an error
    pub failed: usize,
}

/// Write queue counters
#[derive(Debug, Default)]
pub struct WriteQueueMetrics {
    pub enqueued: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub batches: AtomicU64,
    pub bulk_inserts: AtomicU64,
    pub skipped_flushes: AtomicU64,
}

impl WriteQueueMetrics {
    pub fn snapshot(&self) -> WriteQueueMetricsSnapshot {
        WriteQueueMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            bulk_inserts: self.bulk_inserts.load(Ordering::Relaxed),
            skipped_flushes: self.skipped_flushes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteQueueMetricsSnapshot {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub bulk_inserts: u64,
    pub skipped_flushes: u64,
}

struct QueueInner {
    config: WriteQueueConfig,
    storage: Arc<dyn StorageBackend>,
    breaker: Arc<CircuitBreaker>,
    pending: Mutex<PendingQueue>,
    flushing: AtomicBool,
    flush_done: Notify,
    metrics: WriteQueueMetrics,
}

/// Clears the in-progress flag when the flush ends, including on
/// cancellation, and wakes anyone waiting for the flush to finish.
struct FlushGuard<'a> {
    flag: &'a AtomicBool,
    done: &'a Notify,
}

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool, done: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, done })
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.done.notify_waiters();
    }
}

/// Batching write queue in front of a [`StorageBackend`].
///
/// Cloning is cheap; clones share the same pending queue.
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<QueueInner>,
}

impl WriteQueue {
    /// Create a queue in front of `storage`.
    ///
    /// Fails with [`SurgeError::Config`] if `batch_size` or
    /// `flush_interval_ms` is zero.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        breaker: Arc<CircuitBreaker>,
        config: WriteQueueConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(QueueInner {
                config,
                storage,
                breaker,
                pending: Mutex::new(PendingQueue {
                    intents: VecDeque::new(),
                    closed: false,
                }),
                flushing: AtomicBool::new(false),
                flush_done: Notify::new(),
                metrics: WriteQueueMetrics::default(),
            }),
        })
    }

    pub fn config(&self) -> &WriteQueueConfig {
        &self.inner.config
    }

    /// The breaker guarding the storage backend
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn metrics(&self) -> &WriteQueueMetrics {
        &self.inner.metrics
    }

    /// Number of intents waiting for a flush
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().intents.len()
    }

    /// Append a write to the tail of the queue.
    ///
    /// Never waits on I/O; the returned handle completes once the intent's
    /// batch has been processed.
    pub fn enqueue(&self, request: WriteRequest) -> PendingWrite {
        let (tx, rx) = oneshot::channel();
        let kind = request.kind();

        let len = {
            let mut pending = self.inner.pending.lock();
            if pending.closed {
                drop(pending);
                let _ = tx.send(Err(SurgeError::QueueClosed));
                return PendingWrite { rx };
            }
            pending.intents.push_back(WriteIntent {
                request,
                submitted_at: Instant::now(),
                completion: tx,
            });
            pending.intents.len()
        };

        self.inner.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        observe::set_pending(len);
        tracing::trace!("Enqueued {} intent ({} pending)", kind.as_str(), len);
        PendingWrite { rx }
    }

    /// Enqueue a write and wait for its outcome.
    pub async fn submit(&self, request: WriteRequest) -> Result<WriteOutcome> {
        self.enqueue(request).await
    }

    /// Drain one batch from the head of the queue and resolve it.
    ///
    /// At most one flush runs at a time; a call that finds another flush
    /// in progress returns [`FlushOutcome::InProgress`] without touching
    /// the queue.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(_guard) = FlushGuard::acquire(&self.inner.flushing, &self.inner.flush_done)
        else {
            self.inner
                .metrics
                .skipped_flushes
                .fetch_add(1, Ordering::Relaxed);
            return FlushOutcome::InProgress;
        };

        let (batch, remaining) = {
            let mut pending = self.inner.pending.lock();
            if pending.intents.is_empty() {
                return FlushOutcome::Empty;
            }
            let take = pending.intents.len().min(self.inner.config.batch_size);
            let batch: Vec<WriteIntent> = pending.intents.drain(..take).collect();
            (batch, pending.intents.len())
        };
        observe::set_pending(remaining);

        let started = Instant::now();
        let oldest_wait = batch
            .first()
            .map(|intent| started.duration_since(intent.submitted_at))
            .unwrap_or_default();

        let mut report = FlushReport {
            drained: batch.len(),
            ..FlushReport::default()
        };

        let mut rows = Vec::new();
        let mut create_waiters = Vec::new();
        let mut singles = Vec::new();
        for intent in batch {
            match intent.request {
                WriteRequest::Create(user) => {
                    rows.push(user);
                    create_waiters.push(intent.completion);
                }
                WriteRequest::Update { id, patch } => {
                    singles.push((SingleWrite::Update { id, patch }, intent.completion))
                }
                WriteRequest::Delete { id } => {
                    singles.push((SingleWrite::Delete { id }, intent.completion))
                }
            }
        }

        if !rows.is_empty() {
            self.submit_creates(rows, create_waiters, &mut report).await;
        }
        for (request, completion) in singles {
            self.apply_single(request, completion, &mut report).await;
        }

        self.inner.metrics.batches.fetch_add(1, Ordering::Relaxed);
        observe::record_flush(started.elapsed(), report.drained, report.failed);
        tracing::debug!(
            "Flushed {} intents ({} created, {} updated, {} deleted, {} failed, oldest waited {:?}, {} still pending)",
            report.drained,
            report.created,
            report.updated,
            report.deleted,
            report.failed,
            oldest_wait,
            remaining
        );

        FlushOutcome::Flushed(report)
    }

    /// Stop accepting writes and flush until the queue is empty.
    ///
    /// Intents enqueued after this call resolve immediately with
    /// [`SurgeError::QueueClosed`].
    pub async fn close(&self) {
        self.inner.pending.lock().closed = true;

        loop {
            // Registered before trying so a flush ending in between still wakes us.
            let idle = self.inner.flush_done.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            match self.flush().await {
                FlushOutcome::Empty => break,
                FlushOutcome::InProgress => idle.await,
                FlushOutcome::Flushed(_) => {}
            }
        }
        tracing::info!("Write queue closed");
    }

    /// Spawn the periodic flush task on the current tokio runtime.
    ///
    /// The first flush runs immediately, then once every
    /// `flush_interval_ms`. Ticks missed while a flush is running are
    /// skipped rather than replayed.
    pub fn start(&self) -> FlushWorker {
        let queue = self.clone();
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();
        let interval = self.inner.config.flush_interval();

        let handle = tokio::spawn(async move {
            tracing::info!("Write queue flush worker started (interval {:?})", interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        queue.flush().await;
                    }
                }
            }

            tracing::info!("Write queue flush worker stopped");
        });

        FlushWorker {
            queue: self.clone(),
            shutdown,
            handle: Some(handle),
        }
    }

    async fn submit_creates(
        &self,
        rows: Vec<NewUser>,
        waiters: Vec<Completion>,
        report: &mut FlushReport,
    ) {
        let size = rows.len();
        let storage = &self.inner.storage;
        self.inner
            .metrics
            .bulk_inserts
            .fetch_add(1, Ordering::Relaxed);

        let result = self
            .inner
            .breaker
            .call(|| storage.bulk_insert(rows))
            .await;

        let records = match result {
            Ok(records) if records.len() == size => records,
            Ok(records) => {
                let err = SurgeError::BatchSubmission {
                    kind: OperationKind::Create.as_str(),
                    size,
                    reason: format!(
                        "{} returned {} rows for {} inserts",
                        storage.name(),
                        records.len(),
                        size
                    ),
                };
                self.fail_all(waiters, err, report);
                return;
            }
            Err(e) if e.is_circuit_open() => {
                self.fail_all(waiters, e, report);
                return;
            }
            Err(e) => {
                let err = SurgeError::BatchSubmission {
                    kind: OperationKind::Create.as_str(),
                    size,
                    reason: e.to_string(),
                };
                self.fail_all(waiters, err, report);
                return;
            }
        };

        for (completion, record) in waiters.into_iter().zip(records) {
            self.resolve(completion, Ok(WriteOutcome::Created(record)), report);
        }
    }

    async fn apply_single(
        &self,
        write: SingleWrite,
        completion: Completion,
        report: &mut FlushReport,
    ) {
        let storage = &self.inner.storage;
        let breaker = &self.inner.breaker;

        let outcome = match write {
            // Nothing to write; resolve with the current row.
            SingleWrite::Update { id, patch } if patch.is_empty() => breaker
                .call(|| storage.get(id))
                .await
                .and_then(|row| row.map(WriteOutcome::Updated).ok_or_else(|| not_found(id))),
            SingleWrite::Update { id, patch } => breaker
                .call(|| storage.update(id, patch))
                .await
                .and_then(|row| row.map(WriteOutcome::Updated).ok_or_else(|| not_found(id))),
            SingleWrite::Delete { id } => {
                breaker
                    .call(|| storage.delete(id))
                    .await
                    .and_then(|existed| {
                        if existed {
                            Ok(WriteOutcome::Deleted(id))
                        } else {
                            Err(not_found(id))
                        }
                    })
            }
        };

        self.resolve(completion, outcome, report);
    }

    fn fail_all(&self, waiters: Vec<Completion>, err: SurgeError, report: &mut FlushReport) {
        tracing::warn!("Write batch of {} intents failed: {}", waiters.len(), err);
        for completion in waiters {
            self.resolve(completion, Err(err.clone()), report);
        }
    }

    fn resolve(
        &self,
        completion: Completion,
        outcome: Result<WriteOutcome>,
        report: &mut FlushReport,
    ) {
        match &outcome {
            Ok(WriteOutcome::Created(_)) => report.created += 1,
            Ok(WriteOutcome::Updated(_)) => report.updated += 1,
            Ok(WriteOutcome::Deleted(_)) => report.deleted += 1,
            Err(_) => report.failed += 1,
        }
        let counter = if outcome.is_ok() {
            &self.inner.metrics.succeeded
        } else {
            &self.inner.metrics.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if completion.send(outcome).is_err() {
            tracing::trace!("Write intent resolved after its caller stopped waiting");
        }
    }
}

fn not_found(id: UserId) -> SurgeError {
    SurgeError::NotFound(format!("user {}", id))
}

/// Handle to the periodic flush task started by [`WriteQueue::start`]
pub struct FlushWorker {
    queue: WriteQueue,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    /// Stop the timer, then close the queue and drain whatever is left.
    pub async fn stop(mut self) -> Result<()> {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| SurgeError::Internal(format!("Flush worker join error: {}", e)))?;
        }
        self.queue.close().await;
        Ok(())
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown.notify_one();
        }
    }
}
