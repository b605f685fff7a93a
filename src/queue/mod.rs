//! Job queue module
//!
//! The queue is the collaborator that receives job submissions, hands jobs to
//! workers one at a time per slot, and governs redelivery with exponential
//! backoff. Two backends are provided:
//! - [`MemoryQueue`]: in-process, for one-shot runs and tests
//! - [`RedisQueue`]: shared through Redis, for separate submitter and worker
//!   processes

mod memory;
mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use crate::config::QueueConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Queue-assigned job identifier
pub type JobId = u64;

/// Errors raised by queue backends
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Job payload error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue is closed")]
    Closed,
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// The message that asks a worker to scrape one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub page_id: i64,
    pub url: String,
}

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Delay policy between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    /// Base delay in milliseconds
    pub delay: u64,
}

impl Backoff {
    pub fn exponential(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            delay: delay.as_millis() as u64,
        }
    }

    /// Delay before the next delivery after attempt number `attempt` failed
    ///
    /// Exponential backoff doubles per attempt: `delay * 2^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.delay);
        match self.kind {
            BackoffKind::Fixed => base,
            BackoffKind::Exponential => {
                let exponent = attempt.saturating_sub(1).min(20);
                base.saturating_mul(1u32 << exponent)
            }
        }
    }
}

/// Per-job delivery options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum number of deliveries, including the first
    pub attempts: u32,
    pub backoff: Backoff,
}

impl JobOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            attempts: config.max_attempts,
            backoff: Backoff::exponential(config.backoff_delay()),
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

/// One delivery of a job to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: JobId,
    pub job: ScrapeJob,
    /// 1-based number of this attempt
    pub attempt: u32,
    pub options: JobOptions,
}

impl Delivery {
    /// Returns true if a failure of this attempt leaves no retries
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.options.attempts
    }
}

/// What the queue did with a failed delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job will be redelivered after `delay`
    Retry { delay: Duration },
    /// All attempts are used up; the job will not be delivered again
    Exhausted,
}

impl FailureDisposition {
    pub fn will_retry(&self) -> bool {
        matches!(self, Self::Retry { .. })
    }
}

/// Trait for queue backends
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accepts a job for delivery
    async fn submit(&self, job: ScrapeJob, options: JobOptions) -> QueueResult<JobId>;

    /// Waits for the next delivery
    ///
    /// Returns `None` once the queue is closed and has nothing left to hand
    /// out, which tells a worker to stop.
    async fn next(&self) -> QueueResult<Option<Delivery>>;

    /// Acknowledges a successful delivery
    async fn complete(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Reports a failed delivery and schedules a retry if attempts remain
    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<FailureDisposition>;

    /// Stops accepting new work and lets waiting workers drain and exit
    async fn close(&self);
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn submit(&self, job: ScrapeJob, options: JobOptions) -> QueueResult<JobId> {
        (**self).submit(job, options).await
    }

    async fn next(&self) -> QueueResult<Option<Delivery>> {
        (**self).next().await
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        (**self).complete(delivery).await
    }

    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<FailureDisposition> {
        (**self).fail(delivery, error).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Decides what happens after `delivery` failed
pub(crate) fn disposition_for(delivery: &Delivery) -> FailureDisposition {
    if delivery.is_last_attempt() {
        FailureDisposition::Exhausted
    } else {
        FailureDisposition::Retry {
            delay: delivery.options.backoff.delay_after(delivery.attempt),
        }
    }
}
