//! In-process job queue
//!
//! Deliveries live in a `VecDeque` behind a mutex; retries are parked on a
//! timer task and pushed back when their backoff expires. Workers wait on a
//! `Notify` that is pinged whenever the queue state changes.

use crate::queue::{
    disposition_for, Delivery, FailureDisposition, JobId, JobOptions, JobQueue, QueueError,
    QueueResult, ScrapeJob,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    /// Deliveries handed to a worker and not yet completed or failed
    in_flight: usize,
    /// Retries waiting for their backoff to expire
    delayed: usize,
    next_id: JobId,
    closed: bool,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.ready.is_empty() && self.in_flight == 0 && self.delayed == 0
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        // The lock is never held across an await or a panic-prone call
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-process queue with delayed redelivery
///
/// Cloning gives another handle onto the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries ready to be handed out right now
    pub fn ready_len(&self) -> usize {
        self.inner.state().ready.len()
    }

    /// Returns true if nothing is ready, running or waiting to be retried
    pub fn is_drained(&self) -> bool {
        self.inner.state().is_drained()
    }

    fn schedule_retry(&self, delivery: Delivery, delay: std::time::Duration) {
        let inner = Arc::clone(&self.inner);
        let retry = Delivery {
            attempt: delivery.attempt + 1,
            ..delivery
        };

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.state();
                state.delayed -= 1;
                state.ready.push_back(retry);
            }
            inner.notify.notify_waiters();
        });
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn submit(&self, job: ScrapeJob, options: JobOptions) -> QueueResult<JobId> {
        let id = {
            let mut state = self.inner.state();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(Delivery {
                id,
                job,
                attempt: 1,
                options,
            });
            id
        };
        self.inner.notify.notify_waiters();
        Ok(id)
    }

    async fn next(&self) -> QueueResult<Option<Delivery>> {
        loop {
            // Register interest before checking, so a wake-up between the
            // check and the await is not lost
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state();
                if let Some(delivery) = state.ready.pop_front() {
                    state.in_flight += 1;
                    return Ok(Some(delivery));
                }
                if state.closed && state.is_drained() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn complete(&self, _delivery: &Delivery) -> QueueResult<()> {
        {
            let mut state = self.inner.state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, _error: &str) -> QueueResult<FailureDisposition> {
        let disposition = disposition_for(delivery);
        {
            let mut state = self.inner.state();
            state.in_flight = state.in_flight.saturating_sub(1);
            if disposition.will_retry() {
                state.delayed += 1;
            }
        }

        if let FailureDisposition::Retry { delay } = disposition {
            self.schedule_retry(delivery.clone(), delay);
        }

        self.inner.notify.notify_waiters();
        Ok(disposition)
    }

    async fn close(&self) {
        self.inner.state().closed = true;
        self.inner.notify.notify_waiters();
    }
}
