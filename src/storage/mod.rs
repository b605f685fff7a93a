//! Storage module for persisting pages and links
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Page status transitions
//! - Atomic replacement of a page's link set
//! - Paginated reads for pages and links

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::PageStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Largest page size accepted for paginated reads
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size when listing pages
pub const DEFAULT_PAGES_LIMIT: u32 = 10;

/// Default page size when listing a page's links
pub const DEFAULT_LINKS_LIMIT: u32 = 20;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a submitted page in the database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub id: i64,
    pub url: String,
    pub final_url: Option<String>,
    pub title: Option<String>,
    pub status: PageStatus,
    pub link_count: u32,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Represents a link stored for a page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    pub id: i64,
    pub page_id: i64,
    pub href: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A link about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub href: String,
    pub name: Option<String>,
}

/// Field changes applied to a page by the job state machine
#[derive(Debug, Clone, PartialEq)]
pub enum PageUpdate {
    /// An attempt started; clears the previous attempt's error and finish time
    Processing { started_at: DateTime<Utc> },

    /// The attempt succeeded
    Done {
        title: String,
        /// Only set when it differs from the submitted URL
        final_url: Option<String>,
        link_count: u32,
        finished_at: DateTime<Utc>,
    },

    /// The attempt failed
    Failed {
        error: String,
        finished_at: DateTime<Utc>,
    },
}

impl PageUpdate {
    /// Status the page moves to
    pub fn status(&self) -> PageStatus {
        match self {
            Self::Processing { .. } => PageStatus::Processing,
            Self::Done { .. } => PageStatus::Done,
            Self::Failed { .. } => PageStatus::Failed,
        }
    }
}

/// A 1-based page request for paginated reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Validates and builds a pagination request
    ///
    /// `page` must be >= 1 and `limit` in 1..=100.
    pub fn new(page: u32, limit: u32) -> StorageResult<Self> {
        if page < 1 {
            return Err(StorageError::InvalidPagination(
                "Page must be a positive integer".to_string(),
            ));
        }
        if limit < 1 || limit > MAX_PAGE_SIZE {
            return Err(StorageError::InvalidPagination(format!(
                "Limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(Self { page, limit })
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// One page of results plus the totals needed to navigate the rest
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    /// Total number of pages, `ceil(total / limit)`
    pub pages: u64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let limit = pagination.limit as u64;
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: total.div_ceil(limit),
        }
    }
}
