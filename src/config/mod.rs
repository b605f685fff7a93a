//! Configuration module for Link-Scraper
//!
//! Configuration comes from an optional TOML file with environment-style
//! overrides (`REDIS_URL`, `CONCURRENCY`, `MAX_ATTEMPTS`, ...) layered on top.
//!
//! # Example
//!
//! ```no_run
//! use link_scraper::config::load_config_with_env;
//!
//! let config = load_config_with_env(None).unwrap();
//! println!("Worker pool size: {}", config.queue.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetchConfig, QueueConfig, StorageConfig, DEFAULT_USER_AGENT};

// Re-export parser functions
pub use parser::{apply_env_overrides, config_from_env, load_config, load_config_with_env};
pub use validation::validate;
