//! Worker client and bounded fan-out pool.
//!
//! `WorkerClient` turns one worker call into a [`Proposal`] no matter how
//! the call ends. `WorkerPool` fans a set of requests out in sequential
//! batches, never letting more than `max_concurrency` calls run at once.

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::domain::models::Proposal;
use crate::domain::ports::Worker;

/// Invokes a single worker with a caller-enforced timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerClient;

impl WorkerClient {
    /// Call the worker and always return a proposal.
    ///
    /// Transport errors become `error_message`, an elapsed timeout sets
    /// `timed_out`. Latency is wall-clock from call start to resolution.
    pub async fn invoke(worker: &dyn Worker, prompt: &str, limit: Duration) -> Proposal {
        let handle = worker.handle();
        let start = Instant::now();

        match timeout(limit, worker.generate(prompt)).await {
            Ok(Ok(text)) => {
                let latency_ms = elapsed_ms(start);
                tracing::debug!(worker_id = %handle.id, latency_ms, "Worker responded");
                Proposal::succeeded(handle, text, latency_ms)
            }
            Ok(Err(e)) => {
                let latency_ms = elapsed_ms(start);
                tracing::warn!(worker_id = %handle.id, error = %e, "Worker call failed");
                Proposal::failed(handle, e.to_string(), latency_ms)
            }
            Err(_) => {
                let latency_ms = elapsed_ms(start);
                tracing::warn!(
                    worker_id = %handle.id,
                    timeout_ms = limit.as_millis() as u64,
                    "Worker call timed out"
                );
                Proposal::timed_out(handle, limit.as_millis() as u64, latency_ms)
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// One prompt addressed to one worker.
#[derive(Clone)]
pub struct WorkerRequest {
    pub worker: Arc<dyn Worker>,
    pub prompt: String,
}

impl WorkerRequest {
    pub fn new(worker: Arc<dyn Worker>, prompt: impl Into<String>) -> Self {
        Self {
            worker,
            prompt: prompt.into(),
        }
    }
}

/// Receives each result as soon as it arrives.
#[async_trait]
pub trait FanOutObserver: Send + Sync {
    async fn on_result(&self, index: usize, proposal: &Proposal);
}

/// Observer that ignores results.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl FanOutObserver for NoopObserver {
    async fn on_result(&self, _index: usize, _proposal: &Proposal) {}
}

/// Result of a fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    /// Proposals in request order, for every dispatched request.
    pub proposals: Vec<Proposal>,
    /// Requests never dispatched because cancellation was observed.
    pub skipped: usize,
    pub cancelled: bool,
}

impl FanOut {
    pub fn successful(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.iter().filter(|p| p.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successful().count()
    }
}

/// Bounded, batched fan-out over workers.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_concurrency: usize,
    call_timeout: Duration,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            call_timeout,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Fan the requests out in batches of `max_concurrency`.
    ///
    /// Batches run one after another; calls inside a batch run concurrently
    /// and each holds a semaphore permit for its whole duration. The token is
    /// checked before each batch: once cancelled, no further batch is
    /// dispatched, while calls already in flight are drained.
    pub async fn fan_out(
        &self,
        requests: Vec<WorkerRequest>,
        cancel: &CancellationToken,
        observer: &dyn FanOutObserver,
    ) -> FanOut {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut slots: Vec<Option<Proposal>> = vec![None; total];
        let mut dispatched = 0usize;
        let mut cancelled = false;

        let indexed: Vec<(usize, WorkerRequest)> = requests.into_iter().enumerate().collect();

        for (batch_number, batch) in indexed.chunks(self.max_concurrency).enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::info!(
                    batch = batch_number + 1,
                    remaining = total - dispatched,
                    "Cancellation observed, skipping remaining batches"
                );
                break;
            }

            tracing::debug!(batch = batch_number + 1, size = batch.len(), "Dispatching batch");

            let mut in_flight = FuturesUnordered::new();
            for (index, request) in batch.iter().cloned() {
                let semaphore = semaphore.clone();
                let limit = self.call_timeout;
                let worker = request.worker.clone();
                let handle = tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Proposal::failed(request.worker.handle(), "Worker pool closed", 0);
                    };
                    WorkerClient::invoke(request.worker.as_ref(), &request.prompt, limit).await
                });
                in_flight.push(async move {
                    let proposal = match handle.await {
                        Ok(proposal) => proposal,
                        Err(e) => {
                            tracing::error!(worker_id = %worker.handle().id, error = %e, "Worker task panicked");
                            Proposal::failed(worker.handle(), format!("Worker task aborted: {e}"), 0)
                        }
                    };
                    (index, proposal)
                });
                dispatched += 1;
            }

            while let Some((index, proposal)) = in_flight.next().await {
                observer.on_result(index, &proposal).await;
                slots[index] = Some(proposal);
            }
        }

        let proposals: Vec<Proposal> = slots.into_iter().flatten().collect();
        tracing::info!(
            dispatched,
            succeeded = proposals.iter().filter(|p| p.is_success()).count(),
            cancelled,
            "Fan-out finished"
        );

        FanOut {
            skipped: total - dispatched,
            proposals,
            cancelled,
        }
    }
}
