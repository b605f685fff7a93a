//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::PageStatus;
use crate::storage::{LinkRecord, NewLink, PageRecord, PageUpdate, Paginated, Pagination};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Page not found: {0}")]
    PageNotFound(i64),

    #[error("Invalid status transition for page {page_id}: {from} -> {to}")]
    InvalidTransition {
        page_id: i64,
        from: PageStatus,
        to: PageStatus,
    },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This is the persistence collaborator of the job state machine. Methods
/// take `&self` so one handle can be shared by every worker; implementations
/// provide their own interior synchronization.
pub trait Storage: Send + Sync {
    // ===== Page Management =====

    /// Creates a page in the `queued` status and returns it
    fn create_page(&self, url: &str) -> StorageResult<PageRecord>;

    /// Gets a page by ID
    fn find_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>>;

    /// Lists pages, newest first
    fn list_pages(&self, pagination: Pagination) -> StorageResult<Paginated<PageRecord>>;

    /// Applies a status transition with its accompanying fields
    ///
    /// # Errors
    ///
    /// * `PageNotFound` - no page with this ID
    /// * `InvalidTransition` - the page's current status does not allow the
    ///   move (see [`PageStatus::can_transition_to`])
    fn update_page(&self, page_id: i64, update: &PageUpdate) -> StorageResult<()>;

    // ===== Link Management =====

    /// Replaces the full link set of a page
    ///
    /// Deletes every existing link for `page_id` and inserts `links`, as one
    /// all-or-nothing unit. On error the previous link set is untouched.
    fn replace_links(&self, page_id: i64, links: &[NewLink]) -> StorageResult<usize>;

    /// Counts the links currently stored for a page
    fn count_links(&self, page_id: i64) -> StorageResult<u64>;

    /// Gets a page's links in insertion order
    fn find_links(
        &self,
        page_id: i64,
        pagination: Pagination,
    ) -> StorageResult<Paginated<LinkRecord>>;
}

impl<T: Storage + ?Sized> Storage for std::sync::Arc<T> {
    fn create_page(&self, url: &str) -> StorageResult<PageRecord> {
        (**self).create_page(url)
    }

    fn find_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>> {
        (**self).find_page(page_id)
    }

    fn list_pages(&self, pagination: Pagination) -> StorageResult<Paginated<PageRecord>> {
        (**self).list_pages(pagination)
    }

    fn update_page(&self, page_id: i64, update: &PageUpdate) -> StorageResult<()> {
        (**self).update_page(page_id, update)
    }

    fn replace_links(&self, page_id: i64, links: &[NewLink]) -> StorageResult<usize> {
        (**self).replace_links(page_id, links)
    }

    fn count_links(&self, page_id: i64) -> StorageResult<u64> {
        (**self).count_links(page_id)
    }

    fn find_links(
        &self,
        page_id: i64,
        pagination: Pagination,
    ) -> StorageResult<Paginated<LinkRecord>> {
        (**self).find_links(page_id, pagination)
    }
}
