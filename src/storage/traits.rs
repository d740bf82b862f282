//! Storage traits and error types
//!
//! This module defines the trait interface for job store backends and
//! associated error types.

use crate::crawler::SessionProgress;
use crate::output::CrawlJobResult;
use crate::scheduler::JobFailure;
use crate::state::JobStatus;
use crate::storage::CrawlJob;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job already exists: {0}")]
    DuplicateJob(Uuid),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for durable job store implementations
///
/// Every status change goes through one of the `*_job` methods, which
/// enforce the `JobStatus` transition rules.
pub trait JobStore: Send {
    // ===== Submission and lookup =====

    /// Inserts a new pending job
    fn insert_job(&mut self, job: &CrawlJob) -> StorageResult<()>;

    /// Gets a job by ID
    fn get_job(&self, id: Uuid) -> StorageResult<Option<CrawlJob>>;

    /// 1-based position of a pending job among pending jobs, in claim order
    fn queue_position(&self, id: Uuid) -> StorageResult<Option<u64>>;

    // ===== Claiming =====

    /// Earliest run time among pending jobs
    fn next_run_at(&self) -> StorageResult<Option<DateTime<Utc>>>;

    /// Atomically moves the next ready pending job to active
    ///
    /// # Arguments
    ///
    /// * `now` - Jobs with a run time after this are not ready
    ///
    /// # Returns
    ///
    /// The claimed job, or None if nothing is ready
    fn claim_next(&mut self, now: DateTime<Utc>) -> StorageResult<Option<CrawlJob>>;

    /// Gets all active jobs (used for stall recovery at startup)
    fn active_jobs(&self) -> StorageResult<Vec<CrawlJob>>;

    /// Saves a running job's progress
    fn update_progress(&mut self, id: Uuid, progress: &SessionProgress) -> StorageResult<()>;

    // ===== Finishing attempts =====

    /// Records a successful attempt: active -> completed
    fn complete_job(
        &mut self,
        id: Uuid,
        result: &CrawlJobResult,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Records a failed attempt to be retried: active -> pending at `run_at`
    fn retry_job(
        &mut self,
        id: Uuid,
        failure: &JobFailure,
        progress: &SessionProgress,
        run_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Records the final failed attempt: active -> failed
    fn fail_job(
        &mut self,
        id: Uuid,
        failure: &JobFailure,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Retention and statistics =====

    /// Most recently finished jobs with a terminal status, newest first
    fn recent_jobs(&self, status: JobStatus, limit: usize) -> StorageResult<Vec<CrawlJob>>;

    /// Deletes all but the `keep` most recently finished jobs with `status`
    ///
    /// # Returns
    ///
    /// Number of jobs deleted
    fn evict_finished(&mut self, status: JobStatus, keep: u32) -> StorageResult<u64>;

    /// Counts jobs by status
    fn count_by_status(&self, status: JobStatus) -> StorageResult<u64>;
}
