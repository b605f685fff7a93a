//! Redis-backed job queue
//!
//! Layout under a key prefix (default `link-scraper`):
//! - `{prefix}:id`: job ID counter
//! - `{prefix}:job:{id}`: JSON payload with the job, its options and attempt count
//! - `{prefix}:wait`: list of IDs ready for delivery
//! - `{prefix}:active`: list of IDs currently held by a worker
//! - `{prefix}:delayed`: sorted set of IDs scored by their retry time (ms)
//! - `{prefix}:failed`: list of IDs whose attempts are exhausted
//!
//! Every change that touches more than one key runs as a MULTI/EXEC
//! transaction or a Lua script, so a crash between commands cannot lose a
//! job or leave it on two lists.

use crate::queue::{
    disposition_for, Delivery, FailureDisposition, JobId, JobOptions, JobQueue, QueueError,
    QueueResult, ScrapeJob,
};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_PREFIX: &str = "link-scraper";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Moves every delayed ID due at `ARGV[1]` from `KEYS[1]` onto `KEYS[2]`
const PROMOTE_SCRIPT: &str = r#"
    local due = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[1])
    for _, id in ipairs(due) do
        redis.call("ZREM", KEYS[1], id)
        redis.call("LPUSH", KEYS[2], id)
    end
    return due
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredJob {
    data: ScrapeJob,
    opts: JobOptions,
    attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_reason: Option<String>,
}

/// Job queue shared through Redis
pub struct RedisQueue {
    client: redis::Client,
    prefix: String,
    poll_interval: Duration,
    closed: AtomicBool,
}

impl RedisQueue {
    /// Creates a queue client for `redis_url`
    ///
    /// No connection is made until the first operation.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            prefix: DEFAULT_PREFIX.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: AtomicBool::new(false),
        })
    }

    /// Uses a different key prefix, isolating this queue from others
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets how long `next` sleeps between polls of an empty queue
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Moves retries whose backoff has expired back onto the wait list
    async fn promote_delayed(&self, con: &mut MultiplexedConnection) -> QueueResult<()> {
        let now = Utc::now().timestamp_millis();
        let promoted: Vec<JobId> = redis::Script::new(PROMOTE_SCRIPT)
            .key(self.key("delayed"))
            .key(self.key("wait"))
            .arg(now)
            .invoke_async(con)
            .await?;

        for id in promoted {
            debug!("Promoted delayed job {}", id);
        }
        Ok(())
    }

    /// Stores the payload and makes the job ready in one transaction
    fn submit_pipeline(&self, id: JobId, payload: &str) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.job_key(id), payload)
            .ignore()
            .lpush(self.key("wait"), id)
            .ignore();
        pipe
    }

    fn complete_pipeline(&self, id: JobId) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(self.key("active"), 1, id)
            .ignore()
            .del(self.job_key(id))
            .ignore();
        pipe
    }

    /// Records the failed attempt and moves the job off the active list
    ///
    /// A retry lands on the delayed set scored by `retry_at_ms`; an exhausted
    /// job lands on the failed list.
    fn fail_pipeline(
        &self,
        id: JobId,
        payload: &str,
        disposition: FailureDisposition,
        retry_at_ms: i64,
    ) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.job_key(id), payload)
            .ignore()
            .lrem(self.key("active"), 1, id)
            .ignore();
        match disposition {
            FailureDisposition::Retry { .. } => {
                pipe.zadd(self.key("delayed"), id, retry_at_ms).ignore();
            }
            FailureDisposition::Exhausted => {
                pipe.lpush(self.key("failed"), id).ignore();
            }
        }
        pipe
    }

    async fn load(
        &self,
        con: &mut MultiplexedConnection,
        id: JobId,
    ) -> QueueResult<Option<StoredJob>> {
        let payload: Option<String> = con.get(self.job_key(id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn submit(&self, job: ScrapeJob, options: JobOptions) -> QueueResult<JobId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let mut con = self.connection().await?;
        let id: JobId = con.incr(self.key("id"), 1).await?;
        let stored = StoredJob {
            data: job,
            opts: options,
            attempts_made: 0,
            failed_reason: None,
        };
        let payload = serde_json::to_string(&stored)?;
        let () = self
            .submit_pipeline(id, &payload)
            .query_async(&mut con)
            .await?;

        debug!("Submitted job {} for page {}", id, stored.data.page_id);
        Ok(id)
    }

    async fn next(&self) -> QueueResult<Option<Delivery>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut con = self.connection().await?;
        let wait = self.key("wait");
        let active = self.key("active");

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            self.promote_delayed(&mut con).await?;

            let id: Option<JobId> = con.rpoplpush(&wait, &active).await?;
            let Some(id) = id else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            match self.load(&mut con, id).await? {
                Some(stored) => {
                    return Ok(Some(Delivery {
                        id,
                        job: stored.data,
                        attempt: stored.attempts_made + 1,
                        options: stored.opts,
                    }));
                }
                None => {
                    warn!("Job {} has no payload, dropping it", id);
                    con.lrem::<_, _, ()>(&active, 1, id).await?;
                }
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut con = self.connection().await?;
        let () = self
            .complete_pipeline(delivery.id)
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<FailureDisposition> {
        let mut con = self.connection().await?;
        let disposition = disposition_for(delivery);

        let stored = StoredJob {
            data: delivery.job.clone(),
            opts: delivery.options,
            attempts_made: delivery.attempt,
            failed_reason: Some(error.to_string()),
        };
        let payload = serde_json::to_string(&stored)?;
        let retry_at_ms = match disposition {
            FailureDisposition::Retry { delay } => {
                Utc::now().timestamp_millis() + delay.as_millis() as i64
            }
            FailureDisposition::Exhausted => 0,
        };
        let () = self
            .fail_pipeline(delivery.id, &payload, disposition, retry_at_ms)
            .query_async(&mut con)
            .await?;

        Ok(disposition)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
