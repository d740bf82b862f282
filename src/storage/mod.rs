//! Storage module for persisting jobs and page content
//!
//! This module handles:
//! - SQLite job store initialization and schema management
//! - Job lifecycle persistence (submission, claiming, retries, retention)
//! - Raw product page storage

mod blob;
mod schema;
mod sqlite;
mod traits;

pub use blob::{generate_blob_key, BlobError, BlobStore, FsBlobStore};
pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StorageError, StorageResult};

use crate::config::CrawlerConfig;
use crate::crawler::SessionProgress;
use crate::output::CrawlJobResult;
use crate::scheduler::{JobFailure, JobOptions};
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

/// Opens or creates the job database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteJobStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_job_store(path: &Path) -> StorageResult<SqliteJobStore> {
    SqliteJobStore::new(path)
}

/// A crawl job as persisted in the job store
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub id: Uuid,
    pub config: CrawlerConfig,
    /// SHA-256 of the canonical config JSON
    pub config_hash: String,
    pub status: JobStatus,
    /// Attempts finished so far, successful or not
    pub attempts_made: u32,
    pub options: JobOptions,
    pub enqueued_at: DateTime<Utc>,
    /// Not claimable before this time
    pub run_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<CrawlJobResult>,
    pub last_error: Option<JobFailure>,
    pub progress: SessionProgress,
}

impl CrawlJob {
    /// A new pending job, ready to run immediately
    pub fn new(config: CrawlerConfig, config_hash: String, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            config,
            config_hash,
            status: JobStatus::Pending,
            attempts_made: 0,
            options,
            enqueued_at: now,
            run_at: now,
            started_at: None,
            finished_at: None,
            result: None,
            last_error: None,
            progress: SessionProgress::default(),
        }
    }

    /// Returns true if a failure of the current attempt would be retried
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made + 1 < self.options.max_attempts
    }
}
