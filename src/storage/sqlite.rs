//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::PageStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{LinkRecord, NewLink, PageRecord, PageUpdate, Paginated, Pagination};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const PAGE_COLUMNS: &str = "id, url, final_url, title, status, link_count, queued_at,
     started_at, finished_at, error, created_at";

/// SQLite storage backend
///
/// The connection sits behind a mutex so a single handle can be shared by
/// all workers. Each method holds the lock for one statement or transaction.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database file at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database, used by tests and one-shot runs
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        final_url: row.get(2)?,
        title: row.get(3)?,
        status: PageStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(PageStatus::Failed),
        link_count: row.get(5)?,
        queued_at: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
        error: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    Ok(LinkRecord {
        id: row.get(0)?,
        page_id: row.get(1)?,
        href: row.get(2)?,
        name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// SQL list of the statuses a page may be in before moving to `next`
fn source_status_list(next: PageStatus) -> String {
    PageStatus::allowed_sources(next)
        .iter()
        .map(|s| format!("'{}'", s.to_db_string()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Storage for SqliteStorage {
    // ===== Page Management =====

    fn create_page(&self, url: &str) -> StorageResult<PageRecord> {
        let conn = self.conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO pages (url, status, link_count, queued_at, created_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![url, PageStatus::Queued.to_db_string(), now],
        )?;

        let id = conn.last_insert_rowid();
        let page = conn.query_row(
            &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
            params![id],
            page_from_row,
        )?;
        Ok(page)
    }

    fn find_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>> {
        let conn = self.conn()?;
        let page = conn
            .query_row(
                &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
                params![page_id],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn list_pages(&self, pagination: Pagination) -> StorageResult<Paginated<PageRecord>> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pages ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            PAGE_COLUMNS
        ))?;
        let pages = stmt
            .query_map(
                params![pagination.limit as i64, pagination.offset() as i64],
                page_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(pages, total as u64, pagination))
    }

    fn update_page(&self, page_id: i64, update: &PageUpdate) -> StorageResult<()> {
        let conn = self.conn()?;
        let next = update.status();
        let sources = source_status_list(next);

        let changed = match update {
            PageUpdate::Processing { started_at } => conn.execute(
                &format!(
                    "UPDATE pages SET status = ?1, started_at = ?2, finished_at = NULL, error = NULL
                     WHERE id = ?3 AND status IN ({})",
                    sources
                ),
                params![next.to_db_string(), started_at, page_id],
            )?,
            PageUpdate::Done {
                title,
                final_url,
                link_count,
                finished_at,
            } => conn.execute(
                &format!(
                    "UPDATE pages SET status = ?1, title = ?2, final_url = ?3, link_count = ?4,
                     finished_at = ?5, error = NULL
                     WHERE id = ?6 AND status IN ({})",
                    sources
                ),
                params![
                    next.to_db_string(),
                    title,
                    final_url,
                    link_count,
                    finished_at,
                    page_id
                ],
            )?,
            PageUpdate::Failed { error, finished_at } => conn.execute(
                &format!(
                    "UPDATE pages SET status = ?1, error = ?2, finished_at = ?3
                     WHERE id = ?4 AND status IN ({})",
                    sources
                ),
                params![next.to_db_string(), error, finished_at, page_id],
            )?,
        };

        if changed == 1 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM pages WHERE id = ?1",
                params![page_id],
                |row| row.get(0),
            )
            .optional()?;

        match current {
            None => Err(StorageError::PageNotFound(page_id)),
            Some(status) => Err(StorageError::InvalidTransition {
                page_id,
                from: PageStatus::from_db_string(&status).unwrap_or(PageStatus::Failed),
                to: next,
            }),
        }
    }

    // ===== Link Management =====

    fn replace_links(&self, page_id: i64, links: &[NewLink]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM pages WHERE id = ?1",
                params![page_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StorageError::PageNotFound(page_id));
        }

        tx.execute("DELETE FROM links WHERE page_id = ?1", params![page_id])?;

        let now = Utc::now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (page_id, href, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in links {
                stmt.execute(params![page_id, link.href, link.name, now])?;
            }
        }

        // Dropping the transaction without commit rolls everything back
        tx.commit()?;
        Ok(links.len())
    }

    fn count_links(&self, page_id: i64) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE page_id = ?1",
            params![page_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn find_links(
        &self,
        page_id: i64,
        pagination: Pagination,
    ) -> StorageResult<Paginated<LinkRecord>> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE page_id = ?1",
            params![page_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, page_id, href, name, created_at FROM links
             WHERE page_id = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3",
        )?;
        let links = stmt
            .query_map(
                params![page_id, pagination.limit as i64, pagination.offset() as i64],
                link_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated::new(links, total as u64, pagination))
    }
}
