use crate::config::types::{
    Config, CrawlerConfig, DriverConfig, SchedulerConfig, SessionConfig, StorageConfig,
};
use crate::ConfigError;
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

/// Validates the entire service configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_session_config(&config.session)?;
    validate_driver_config(&config.driver)?;
    validate_storage_config(&config.storage)?;
    validate_socket_addr("server.bind", &config.server.bind)?;
    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-jobs must be between 1 and 100, got {}",
            config.max_concurrent_jobs
        )));
    }

    if config.admission_limit() < 1 {
        return Err(ConfigError::Validation(
            "admission-limit must be >= 1".to_string(),
        ));
    }

    if config.admission_window_ms < 1 {
        return Err(ConfigError::Validation(
            "admission-window-ms must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.job_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "job-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll-interval-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.page_concurrency < 1 || config.page_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "page-concurrency must be between 1 and 100, got {}",
            config.page_concurrency
        )));
    }

    if config.card_fanout < 1 {
        return Err(ConfigError::Validation(
            "card-fanout must be >= 1".to_string(),
        ));
    }

    if config.selector_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "selector-timeout-ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_driver_config(config: &DriverConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.pool_size == Some(0) {
        return Err(ConfigError::Validation(
            "pool-size must be >= 1".to_string(),
        ));
    }

    for entry in &config.host_overrides {
        if entry.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "host-overrides entries need a host".to_string(),
            ));
        }
        validate_socket_addr("host-overrides.address", &entry.address)?;
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.blob_dir.is_empty() {
        return Err(ConfigError::Validation(
            "blob-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_socket_addr(field: &str, value: &str) -> Result<(), ConfigError> {
    value
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidAddress(format!("{} '{}': {}", field, value, e)))
}

/// Machine-readable reason a crawl configuration was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// A required field is absent or empty
    MissingConfig,
    /// A start URL or pattern is not a usable URL
    InvalidUrls,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingConfig => "MISSING_CONFIG",
            Self::InvalidUrls => "INVALID_URLS",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected crawl configuration
#[derive(Debug, Clone, Error, Serialize)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ValidationError {
    pub fn missing(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            code: ValidationCode::MissingConfig,
            message: message.into(),
            details,
        }
    }

    pub fn invalid_urls(message: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            code: ValidationCode::InvalidUrls,
            message: message.into(),
            details,
        }
    }
}

/// Validates a submitted crawl configuration
///
/// Start URLs are checked first, so a config with no start URLs is always
/// reported as `INVALID_URLS` even if other fields are missing too.
///
/// # Returns
///
/// * `Ok(())` - The config can be queued
/// * `Err(ValidationError)` - The first class of problem found, with every
///   offending field or value listed in `details`
pub fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ValidationError> {
    if config.start_urls.is_empty() {
        return Err(ValidationError::invalid_urls(
            "startUrls must contain at least one URL",
            Vec::new(),
        ));
    }

    let bad_urls: Vec<String> = config
        .start_urls
        .iter()
        .filter(|raw| !is_absolute_http_url(raw))
        .cloned()
        .collect();
    if !bad_urls.is_empty() {
        return Err(ValidationError::invalid_urls(
            "startUrls must be absolute http(s) URLs",
            bad_urls,
        ));
    }

    let mut missing = Vec::new();
    if config.listing_patterns.is_empty() {
        missing.push("listingPatterns".to_string());
    }
    if config.product_patterns.is_empty() {
        missing.push("productPatterns".to_string());
    }

    let selectors = &config.selectors;
    for (name, value) in [
        ("selectors.productCard", &selectors.product_card),
        ("selectors.pagination", &selectors.pagination),
        ("selectors.productLink", &selectors.product_link),
        ("selectors.productName", &selectors.product_name),
        ("selectors.productPrice", &selectors.product_price),
    ] {
        if value.trim().is_empty() {
            missing.push(name.to_string());
        }
    }

    if config.max_pages == Some(0) {
        missing.push("maxPages (must be at least 1)".to_string());
    }

    if !missing.is_empty() {
        return Err(ValidationError::missing(
            "required crawl configuration is missing",
            missing,
        ));
    }

    let bad_patterns: Vec<String> = config
        .listing_patterns
        .iter()
        .chain(config.product_patterns.iter())
        .filter(|raw| !is_absolute_http_url(raw))
        .cloned()
        .collect();
    if !bad_patterns.is_empty() {
        return Err(ValidationError::invalid_urls(
            "listingPatterns and productPatterns must be absolute http(s) URLs",
            bad_patterns,
        ));
    }

    Ok(())
}

fn is_absolute_http_url(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map_or(false, |h| !h.is_empty())
        }
        Err(_) => false,
    }
}
