//! Worker module
//!
//! - [`JobProcessor`]: the per-job state machine
//! - [`WorkerPool`]: fixed-size pool feeding deliveries to the processor

mod pool;
mod processor;

pub use pool::{JobEvent, PoolStats, WorkerPool};
pub use processor::{JobOutcome, JobProcessor};
