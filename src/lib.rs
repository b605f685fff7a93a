//! Link-Scraper: a background link harvester
//!
//! This crate takes submitted URLs, runs each one as a queued scrape job that
//! fetches the page, extracts its hyperlinks, deduplicates them and persists the
//! result for later paginated retrieval.

pub mod config;
pub mod intake;
pub mod queue;
pub mod scrape;
pub mod state;
pub mod storage;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for a scrape job attempt
///
/// Every variant is recorded onto the page as its `error` message and then
/// handed back to the queue, which decides whether the job is redelivered.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid or potentially unsafe URL: {url}")]
    UnsafeUrl { url: String },

    #[error(transparent)]
    Fetch(#[from] scrape::FetchError),

    #[error("HTML parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Storage error: {0}")]
    Persistence(#[from] storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for scrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::PageStatus;
pub use url::{canonicalize, DeploymentMode, UrlSafetyFilter};
