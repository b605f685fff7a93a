use crate::config::types::{Config, FetchConfig, QueueConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_queue_config(&config.queue)?;
    validate_fetch_config(&config.fetch)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

/// Validates queue and worker pool configuration
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    let redis_url = Url::parse(&config.redis_url)
        .map_err(|e| ConfigError::Validation(format!("Invalid redis_url: {}", e)))?;
    if !matches!(redis_url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
        return Err(ConfigError::Validation(format!(
            "redis_url must use a redis:// scheme, got '{}'",
            config.redis_url
        )));
    }

    Ok(())
}

/// Validates fetcher limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_content_size == 0 {
        return Err(ConfigError::Validation(
            "max_content_size must be > 0".to_string(),
        ));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be > 0ms".to_string(),
        ));
    }

    // max_redirects = 0 is allowed: it disables redirect following

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
