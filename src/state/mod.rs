//! State module for tracking scrape job progress
//!
//! `PageStatus` is the lifecycle of a submitted page: `queued`, `processing`,
//! then `done` or `failed`. The transition rules live here so storage backends
//! and the job processor agree on them.

mod page_status;

pub use page_status::PageStatus;
