//! Debounced batch scheduler.
//!
//! Submissions land in a shared queue; the first submission arms a one-shot
//! debounce timer, further submissions in that span reuse it. When the timer
//! fires the queue is drained in one pass: requests are partitioned by model,
//! stably sorted by priority inside each partition and cut into bounded
//! chunks. Partitions run concurrently, one task per model; inside a
//! partition, chunks and their requests run strictly in order.

use super::types::{BatchDispatcher, BatchOutcome, BatchRequest, BatchResponse};
use crate::config::BatchConfig;
use crate::telemetry::{EventDetail, EventDraft, TelemetryEngine};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Counter snapshot; `pending` is read live from the queue.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchStats {
    pub submitted: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub flushes: u64,
    pub pending: usize,
}

#[derive(Default)]
struct AtomicBatchStats {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    flushes: AtomicU64,
}

struct QueuedRequest {
    request: BatchRequest,
    reply: oneshot::Sender<Result<BatchResponse>>,
}

struct Inner<D> {
    config: BatchConfig,
    dispatcher: D,
    telemetry: Arc<TelemetryEngine>,
    queue: Mutex<Vec<QueuedRequest>>,
    timer_armed: AtomicBool,
    stats: AtomicBatchStats,
}

/// Cloneable handle to the shared scheduler state.
pub struct BatchScheduler<D: BatchDispatcher> {
    inner: Arc<Inner<D>>,
}

impl<D: BatchDispatcher> Clone for BatchScheduler<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: BatchDispatcher + 'static> BatchScheduler<D> {
    pub fn new(config: BatchConfig, dispatcher: D, telemetry: Arc<TelemetryEngine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dispatcher,
                telemetry,
                queue: Mutex::new(Vec::new()),
                timer_armed: AtomicBool::new(false),
                stats: AtomicBatchStats::default(),
            }),
        }
    }

    /// Queues a request and waits for its reply. The call resolves once the
    /// debounced batch containing the request has dispatched it.
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchResponse> {
        let (reply, receiver) = oneshot::channel();
        self.inner.lock_queue().push(QueuedRequest { request, reply });
        self.inner.stats.submitted.fetch_add(1, Ordering::Relaxed);
        Inner::arm_timer(&self.inner);

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(Error::runtime("batch worker dropped the request")),
        }
    }

    /// Drains and dispatches the queue immediately, without waiting for the
    /// debounce timer. Replies still arrive through the pending `submit`
    /// calls; this returns once all partitions have been handed off.
    pub async fn flush(&self) {
        Inner::flush(&self.inner).await;
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    pub fn stats(&self) -> BatchStats {
        let stats = &self.inner.stats;
        BatchStats {
            submitted: stats.submitted.load(Ordering::Relaxed),
            dispatched: stats.dispatched.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            flushes: stats.flushes.load(Ordering::Relaxed),
            pending: self.pending_len(),
        }
    }
}

impl<D: BatchDispatcher + 'static> Inner<D> {
    fn lock_queue(&self) -> MutexGuard<'_, Vec<QueuedRequest>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules a flush one debounce interval from now, unless one is
    /// already scheduled.
    fn arm_timer(this: &Arc<Self>) {
        if this.timer_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.debounce()).await;
            Inner::flush(&inner).await;
        });
    }

    async fn flush(this: &Arc<Self>) {
        // Cleared before draining, so submissions racing with this pass
        // either join the current drain or arm the next timer.
        this.timer_armed.store(false, Ordering::Release);
        let drained: Vec<QueuedRequest> = {
            let mut queue = this.lock_queue();
            queue.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }
        this.stats.flushes.fetch_add(1, Ordering::Relaxed);

        let mut by_model: BTreeMap<String, Vec<QueuedRequest>> = BTreeMap::new();
        for queued in drained {
            by_model
                .entry(queued.request.model.clone())
                .or_default()
                .push(queued);
        }
        debug!(models = by_model.len(), "dispatching batch");

        for (model, mut group) in by_model {
            // Stable sort: equal priorities keep submission order.
            group.sort_by(|a, b| b.request.priority.cmp(&a.request.priority));
            let chunks = chunk(group, this.config.max_chunk_size.max(1));
            let inner = Arc::clone(this);
            tokio::spawn(async move {
                for chunk in chunks {
                    inner.run_chunk(&model, chunk).await;
                }
            });
        }

        // Requests that arrived mid-flush still need a timer.
        if !this.lock_queue().is_empty() {
            Inner::arm_timer(this);
        }
    }

    /// Dispatches one chunk, request by request.
    async fn run_chunk(&self, model: &str, chunk: Vec<QueuedRequest>) {
        let batch_size = chunk.len();
        for queued in chunk {
            let started = Instant::now();
            let result = self.dispatcher.dispatch(&queued.request).await;
            let elapsed = started.elapsed();

            let served_from_cache = result
                .as_ref()
                .map(|outcome| outcome.served_from_cache)
                .unwrap_or(false);
            self.telemetry.record_event(
                EventDraft::new(
                    "batch",
                    EventDetail::BatchDispatch {
                        request_id: queued.request.id,
                        model: model.to_string(),
                        batch_size,
                        served_from_cache,
                    },
                )
                .with_duration(elapsed),
            );

            let response = match result {
                Ok(outcome) => {
                    self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                    Ok(to_response(&queued.request, outcome, elapsed, batch_size))
                }
                Err(err) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(model, error = %err, "batched dispatch failed");
                    Err(err)
                }
            };
            if queued.reply.send(response).is_err() {
                debug!(model, "submitter went away before its reply");
            }
        }
    }
}

fn to_response(
    request: &BatchRequest,
    outcome: BatchOutcome,
    elapsed: std::time::Duration,
    batch_size: usize,
) -> BatchResponse {
    BatchResponse {
        id: request.id,
        model: request.model.clone(),
        content: outcome.content,
        usage: outcome.usage,
        processing_time_ms: elapsed.as_millis() as u64,
        served_from_cache: outcome.served_from_cache,
        batch_size,
    }
}

fn chunk(group: Vec<QueuedRequest>, size: usize) -> Vec<Vec<QueuedRequest>> {
    let mut chunks: Vec<Vec<QueuedRequest>> = Vec::new();
    for item in group {
        match chunks.last_mut() {
            Some(chunk) if chunk.len() < size => chunk.push(item),
            _ => chunks.push(vec![item]),
        }
    }
    chunks
}
