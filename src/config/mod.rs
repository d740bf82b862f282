//! Configuration module
//!
//! Two kinds of configuration live here: the service configuration loaded
//! from a TOML file at startup, and the per-job crawl configuration submitted
//! as JSON over the API.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Pages per job at once: {}", config.session.page_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DriverConfig, HostOverride, SchedulerConfig, SelectorConfig,
    ServerConfig, SessionConfig, StorageConfig, DEFAULT_EAN_LABEL, DEFAULT_MAX_PAGES,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, crawler_config_hash, load_config, load_config_with_hash, parse_config,
};

pub use validation::{validate_crawler_config, ValidationCode, ValidationError};
