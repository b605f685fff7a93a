use crate::config::types::Config;
use crate::config::validation::validate;
use crate::url::DeploymentMode;
use crate::ConfigError;
use std::path::Path;
use std::str::FromStr;

/// Loads and parses a configuration file from the given path
///
/// Every key is optional; missing keys keep their defaults. Environment
/// overrides are *not* applied here, see [`load_config_with_env`].
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use link_scraper::config::load_config;
///
/// let config = load_config(Path::new("link-scraper.toml")).unwrap();
/// println!("Concurrency: {}", config.queue.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Builds a configuration from defaults plus the process environment
pub fn config_from_env() -> Result<Config, ConfigError> {
    let mut config = Config::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Loads an optional config file, then applies the process environment on top
pub fn load_config_with_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Applies environment-style overrides to a configuration
///
/// `lookup` maps a variable name to its value. Passing a closure instead of
/// reading `std::env` directly keeps tests free of process-wide mutation.
///
/// # Recognized variables
///
/// | Variable | Field |
/// |----------|-------|
/// | `REDIS_URL` | `queue.redis_url` |
/// | `CONCURRENCY` | `queue.concurrency` |
/// | `MAX_ATTEMPTS` | `queue.max_attempts` |
/// | `BACKOFF_DELAY` | `queue.backoff_delay` (ms) |
/// | `MAX_CONTENT_SIZE` | `fetch.max_content_size` (bytes) |
/// | `REQUEST_TIMEOUT` | `fetch.request_timeout` (ms) |
/// | `MAX_REDIRECTS` | `fetch.max_redirects` |
/// | `USER_AGENT` | `fetch.user_agent` |
/// | `DATABASE_PATH` | `storage.database_path` |
/// | `APP_ENV` | `mode` |
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("REDIS_URL") {
        config.queue.redis_url = value;
    }
    if let Some(value) = lookup("CONCURRENCY") {
        config.queue.concurrency = parse_var("CONCURRENCY", &value)?;
    }
    if let Some(value) = lookup("MAX_ATTEMPTS") {
        config.queue.max_attempts = parse_var("MAX_ATTEMPTS", &value)?;
    }
    if let Some(value) = lookup("BACKOFF_DELAY") {
        config.queue.backoff_delay = parse_var("BACKOFF_DELAY", &value)?;
    }
    if let Some(value) = lookup("MAX_CONTENT_SIZE") {
        config.fetch.max_content_size = parse_var("MAX_CONTENT_SIZE", &value)?;
    }
    if let Some(value) = lookup("REQUEST_TIMEOUT") {
        config.fetch.request_timeout = parse_var("REQUEST_TIMEOUT", &value)?;
    }
    if let Some(value) = lookup("MAX_REDIRECTS") {
        config.fetch.max_redirects = parse_var("MAX_REDIRECTS", &value)?;
    }
    if let Some(value) = lookup("USER_AGENT") {
        config.fetch.user_agent = value;
    }
    if let Some(value) = lookup("DATABASE_PATH") {
        config.storage.database_path = value;
    }
    if let Some(value) = lookup("APP_ENV") {
        config.mode = parse_var::<DeploymentMode>("APP_ENV", &value)?;
    }
    Ok(())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
