//! Worker pool - a fixed number of workers pulling jobs from a shared queue
//!
//! Each worker takes one delivery at a time, runs it through the
//! [`JobProcessor`], and reports the outcome back to the queue. Outcomes are
//! also published as [`JobEvent`]s on a broadcast channel for observers.

use crate::queue::{Delivery, JobId, JobQueue};
use crate::storage::Storage;
use crate::worker::JobProcessor;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Capacity of the event channel; slow subscribers see `Lagged` past this
const EVENT_CAPACITY: usize = 256;

/// Pause after a queue backend error before asking again
const QUEUE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Outcome of one job attempt, published by the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum JobEvent {
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: JobId,
        page_id: i64,
        links: u32,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: JobId,
        page_id: i64,
        error: String,
        attempt: u32,
        will_retry: bool,
    },
}

impl JobEvent {
    pub fn page_id(&self) -> i64 {
        match self {
            Self::Completed { page_id, .. } | Self::Failed { page_id, .. } => *page_id,
        }
    }
}

/// Attempt counts for a pool run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    /// Failed attempts that were scheduled for redelivery
    pub retried: usize,
    /// Failed attempts with no retries left
    pub failed: usize,
}

impl PoolStats {
    fn merge(&mut self, other: PoolStats) {
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
    }
}

/// Fixed-size pool of workers
pub struct WorkerPool<S: Storage, Q: JobQueue> {
    processor: JobProcessor<S>,
    queue: Arc<Q>,
    concurrency: usize,
    events: broadcast::Sender<JobEvent>,
}

impl<S, Q> WorkerPool<S, Q>
where
    S: Storage + 'static,
    Q: JobQueue + 'static,
{
    pub fn new(processor: JobProcessor<S>, queue: Arc<Q>, concurrency: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            processor,
            queue,
            concurrency: concurrency.max(1),
            events,
        }
    }

    /// Subscribes to job outcome events
    ///
    /// Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs workers until the queue is closed and drained
    pub async fn run(&self) -> PoolStats {
        self.run_until(std::future::pending()).await
    }

    /// Runs workers until the queue is drained or `shutdown` resolves
    ///
    /// On shutdown the queue is closed; workers finish the attempt they hold
    /// and then exit.
    pub async fn run_until<F>(&self, shutdown: F) -> PoolStats
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Starting {} workers", self.concurrency);

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            workers.spawn(worker_loop(
                worker_id,
                self.processor.clone(),
                Arc::clone(&self.queue),
                self.events.clone(),
            ));
        }

        tokio::pin!(shutdown);
        let mut closing = false;
        let mut stats = PoolStats::default();

        loop {
            tokio::select! {
                _ = &mut shutdown, if !closing => {
                    tracing::info!("Shutdown requested, waiting for workers to finish");
                    self.queue.close().await;
                    closing = true;
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(worker_stats)) => stats.merge(worker_stats),
                    Some(Err(e)) => tracing::error!("Worker task failed: {}", e),
                    None => break,
                },
            }
        }

        tracing::info!(
            "Workers stopped: {} completed, {} retried, {} failed",
            stats.completed,
            stats.retried,
            stats.failed
        );
        stats
    }
}

async fn worker_loop<S, Q>(
    worker_id: usize,
    processor: JobProcessor<S>,
    queue: Arc<Q>,
    events: broadcast::Sender<JobEvent>,
) -> PoolStats
where
    S: Storage,
    Q: JobQueue,
{
    let mut stats = PoolStats::default();

    loop {
        let delivery = match queue.next().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Worker {}: queue error: {}", worker_id, e);
                tokio::time::sleep(QUEUE_ERROR_PAUSE).await;
                continue;
            }
        };

        tracing::debug!(
            "Worker {} took job {} (attempt {}/{})",
            worker_id,
            delivery.id,
            delivery.attempt,
            delivery.options.attempts
        );

        let event = handle_delivery(&processor, queue.as_ref(), &delivery, &mut stats).await;
        // No subscribers is fine
        let _ = events.send(event);
    }

    tracing::debug!("Worker {} exiting", worker_id);
    stats
}

async fn handle_delivery<S, Q>(
    processor: &JobProcessor<S>,
    queue: &Q,
    delivery: &Delivery,
    stats: &mut PoolStats,
) -> JobEvent
where
    S: Storage,
    Q: JobQueue,
{
    match processor.process(&delivery.job).await {
        Ok(outcome) => {
            if let Err(e) = queue.complete(delivery).await {
                tracing::error!("Failed to acknowledge job {}: {}", delivery.id, e);
            }
            stats.completed += 1;
            JobEvent::Completed {
                job_id: delivery.id,
                page_id: delivery.job.page_id,
                links: outcome.links,
            }
        }
        Err(error) => {
            let message = error.to_string();
            let will_retry = match queue.fail(delivery, &message).await {
                Ok(disposition) => disposition.will_retry(),
                Err(e) => {
                    tracing::error!("Failed to report failure of job {}: {}", delivery.id, e);
                    false
                }
            };

            if will_retry {
                stats.retried += 1;
            } else {
                stats.failed += 1;
                tracing::warn!(
                    "Job {} for page {} gave up after {} attempts: {}",
                    delivery.id,
                    delivery.job.page_id,
                    delivery.attempt,
                    message
                );
            }

            JobEvent::Failed {
                job_id: delivery.id,
                page_id: delivery.job.page_id,
                error: message,
                attempt: delivery.attempt,
                will_retry,
            }
        }
    }
}
