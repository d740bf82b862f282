//! Catalog Harvester: a queue-driven crawler for paginated catalog sites
//!
//! This crate accepts crawl configurations, runs them as durable jobs under
//! concurrency and retry limits, and drives a per-job traversal of listing and
//! product pages through a pluggable page driver.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid crawl configuration: {0}")]
    Validation(#[from] config::ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Blob store error: {0}")]
    Blob(#[from] storage::BlobError),

    #[error("Page driver error: {0}")]
    Driver(#[from] crawler::DriverError),

    #[error("Crawl session error: {0}")]
    Session(#[from] crawler::SessionError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Scheduler is shutting down")]
    ShuttingDown,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid address in config: {0}")]
    InvalidAddress(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, CrawlerConfig};
pub use scheduler::JobScheduler;
pub use state::{JobStatus, PaginationState};
pub use url::{classify, normalize_url, UrlClass, UrlClassifier};
