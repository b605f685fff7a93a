use crate::url::DeploymentMode;
use serde::Deserialize;
use std::time::Duration;

/// Default user agent sent with every page fetch
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; LinkScraper/1.0; +https://example.com/bot)";

/// Main configuration structure for Link-Scraper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment mode; `production` turns on the private-network block
    pub mode: DeploymentMode,
    pub queue: QueueConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
}

/// Job queue and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Location of the Redis queue backend
    #[serde(rename = "redis-url")]
    pub redis_url: String,

    /// Number of jobs processed concurrently
    pub concurrency: usize,

    /// Maximum number of deliveries per job
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-delay")]
    pub backoff_delay: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            concurrency: 5,
            max_attempts: 3,
            backoff_delay: 5000,
        }
    }
}

impl QueueConfig {
    pub fn backoff_delay(&self) -> Duration {
        Duration::from_millis(self.backoff_delay)
    }
}

/// Page fetcher limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum response body size in bytes
    #[serde(rename = "max-content-size")]
    pub max_content_size: u64,

    /// Whole-request timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Maximum number of redirect hops followed
    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_content_size: 5 * 1024 * 1024,
            request_timeout: 30_000,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "link-scraper.db".to_string(),
        }
    }
}
