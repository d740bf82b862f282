use serde::{Deserialize, Serialize};

/// Default page budget per crawl job when the job config leaves it out
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Default label used to locate the EAN on product pages
pub const DEFAULT_EAN_LABEL: &str = "EAN";

/// Main service configuration, loaded from TOML
///
/// Every section and key is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Job queue and worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once
    #[serde(rename = "max-concurrent-jobs", default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Job starts allowed per admission window (defaults to max-concurrent-jobs)
    #[serde(rename = "admission-limit", default)]
    pub admission_limit: Option<usize>,

    /// Length of the rolling admission window (milliseconds)
    #[serde(rename = "admission-window-ms", default = "default_admission_window_ms")]
    pub admission_window_ms: u64,

    /// Attempts per job, including the first run
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of random jitter added to each retry delay (milliseconds)
    #[serde(rename = "backoff-jitter-ms", default)]
    pub backoff_jitter_ms: u64,

    /// Wall-clock limit for a single attempt (seconds)
    #[serde(rename = "job-timeout-secs", default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Completed jobs retained for inspection
    #[serde(rename = "keep-completed", default = "default_keep_completed")]
    pub keep_completed: u32,

    /// Failed jobs retained for inspection
    #[serde(rename = "keep-failed", default = "default_keep_failed")]
    pub keep_failed: u32,

    /// How often idle workers re-check the queue (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SchedulerConfig {
    /// Effective admission limit
    pub fn admission_limit(&self) -> usize {
        self.admission_limit.unwrap_or(self.max_concurrent_jobs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            admission_limit: None,
            admission_window_ms: default_admission_window_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter_ms: 0,
            job_timeout_secs: default_job_timeout_secs(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Per-job traversal configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Maximum pages open at once within one job
    #[serde(rename = "page-concurrency", default = "default_page_concurrency")]
    pub page_concurrency: usize,

    /// Links collected from product cards per listing page
    #[serde(rename = "card-fanout", default = "default_card_fanout")]
    pub card_fanout: usize,

    /// Links collected by the product-link selector per listing page
    #[serde(rename = "product-fanout", default = "default_product_fanout")]
    pub product_fanout: usize,

    /// How long to wait for an expected selector (milliseconds)
    #[serde(rename = "selector-timeout-ms", default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,

    /// Whether a product without an EAN counts as an extraction failure
    #[serde(rename = "require-ean", default = "default_true")]
    pub require_ean: bool,

    /// Selectors tried, in order, to dismiss cookie consent overlays
    #[serde(rename = "consent-selectors", default = "default_consent_selectors")]
    pub consent_selectors: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_concurrency: default_page_concurrency(),
            card_fanout: default_card_fanout(),
            product_fanout: default_product_fanout(),
            selector_timeout_ms: default_selector_timeout_ms(),
            require_ean: true,
            consent_selectors: default_consent_selectors(),
        }
    }
}

/// Page driver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Page contexts shared by all jobs (defaults to jobs x page-concurrency)
    #[serde(rename = "pool-size", default)]
    pub pool_size: Option<usize>,

    /// Static host to address mappings, bypassing DNS
    #[serde(rename = "host-overrides", default)]
    pub host_overrides: Vec<HostOverride>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
            pool_size: None,
            host_overrides: Vec::new(),
        }
    }
}

/// A single DNS override entry
#[derive(Debug, Clone, Deserialize)]
pub struct HostOverride {
    pub host: String,
    /// Socket address, e.g. "127.0.0.1:8080"
    pub address: String,
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite job database
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Directory for raw product page content
    #[serde(rename = "blob-dir", default = "default_blob_dir")]
    pub blob_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            blob_dir: default_blob_dir(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Crawl job configuration, as submitted over the API
///
/// All fields default so that incomplete submissions reach validation and
/// are reported as missing rather than as parse errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlerConfig {
    pub start_urls: Vec<String>,
    pub listing_patterns: Vec<String>,
    pub product_patterns: Vec<String>,
    pub selectors: SelectorConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ean_label: Option<String>,
}

impl CrawlerConfig {
    /// Page budget for the job
    pub fn max_pages(&self) -> u32 {
        self.max_pages.unwrap_or(DEFAULT_MAX_PAGES)
    }

    /// Label text used to find the EAN
    pub fn ean_label(&self) -> &str {
        match self.ean_label.as_deref() {
            Some(label) if !label.trim().is_empty() => label,
            _ => DEFAULT_EAN_LABEL,
        }
    }
}

/// CSS selectors used to read listing and product pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SelectorConfig {
    pub product_card: String,
    pub pagination: String,
    pub product_link: String,
    pub product_name: String,
    pub product_price: String,
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_admission_window_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_job_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_keep_completed() -> u32 {
    100
}

fn default_keep_failed() -> u32 {
    200
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_page_concurrency() -> usize {
    10
}

fn default_card_fanout() -> usize {
    100
}

fn default_product_fanout() -> usize {
    5
}

fn default_selector_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_consent_selectors() -> Vec<String> {
    vec![
        "#onetrust-accept-btn-handler".to_string(),
        "button#accept-cookies".to_string(),
        "[data-testid='cookie-accept']".to_string(),
    ]
}

fn default_user_agent() -> String {
    format!("catalog-harvester/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_database_path() -> String {
    "./harvester.db".to_string()
}

fn default_blob_dir() -> String {
    "./blobs".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
