//! SQLite job store implementation
//!
//! This module provides a SQLite-based implementation of the JobStore trait.
//! Structured fields (config, options, result, error, progress) are stored
//! as JSON text; run times are kept as epoch milliseconds so readiness can
//! be compared in SQL.

use crate::crawler::SessionProgress;
use crate::output::CrawlJobResult;
use crate::scheduler::JobFailure;
use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{JobStore, StorageError, StorageResult};
use crate::storage::CrawlJob;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, config, config_hash, status, attempts_made, options, enqueued_at, \
     run_at_ms, started_at, finished_at, result, last_error, progress";

/// SQLite job store backend
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Opens or creates a job database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteJobStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// A jobs row before JSON and time decoding
struct JobRow {
    id: String,
    config: String,
    config_hash: String,
    status: String,
    attempts_made: u32,
    options: String,
    enqueued_at: String,
    run_at_ms: i64,
    started_at: Option<String>,
    finished_at: Option<String>,
    result: Option<String>,
    last_error: Option<String>,
    progress: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            config: row.get(1)?,
            config_hash: row.get(2)?,
            status: row.get(3)?,
            attempts_made: row.get(4)?,
            options: row.get(5)?,
            enqueued_at: row.get(6)?,
            run_at_ms: row.get(7)?,
            started_at: row.get(8)?,
            finished_at: row.get(9)?,
            result: row.get(10)?,
            last_error: row.get(11)?,
            progress: row.get(12)?,
        })
    }

    fn into_job(self) -> StorageResult<CrawlJob> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::Corrupt(format!("bad job id '{}': {}", self.id, e)))?;
        let status = JobStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown status '{}' on job {}", self.status, id))
        })?;

        Ok(CrawlJob {
            id,
            config: serde_json::from_str(&self.config)?,
            config_hash: self.config_hash,
            status,
            attempts_made: self.attempts_made,
            options: serde_json::from_str(&self.options)?,
            enqueued_at: parse_time(&self.enqueued_at)?,
            run_at: from_millis(self.run_at_ms)?,
            started_at: self.started_at.as_deref().map(parse_time).transpose()?,
            finished_at: self.finished_at.as_deref().map(parse_time).transpose()?,
            result: self.result.as_deref().map(serde_json::from_str).transpose()?,
            last_error: self.last_error.as_deref().map(serde_json::from_str).transpose()?,
            progress: self
                .progress
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn parse_time(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn from_millis(ms: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Corrupt(format!("bad run time {}", ms)))
}

fn load_job(conn: &Connection, id: &str) -> StorageResult<Option<CrawlJob>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], JobRow::from_row)
        .optional()?;
    row.map(JobRow::into_job).transpose()
}

fn current_status(conn: &Connection, id: Uuid) -> StorageResult<JobStatus> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM jobs WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let raw = raw.ok_or(StorageError::JobNotFound(id))?;
    JobStatus::from_db_string(&raw)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{}' on job {}", raw, id)))
}

fn check_transition(conn: &Connection, id: Uuid, to: JobStatus) -> StorageResult<()> {
    let from = current_status(conn, id)?;
    if !from.can_transition_to(to) {
        return Err(StorageError::InvalidTransition { from, to });
    }
    Ok(())
}

impl JobStore for SqliteJobStore {
    // ===== Submission and lookup =====

    fn insert_job(&mut self, job: &CrawlJob) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM jobs WHERE id = ?1",
                params![job.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StorageError::DuplicateJob(job.id));
        }

        self.conn.execute(
            "INSERT INTO jobs (id, config, config_hash, status, attempts_made, options, enqueued_at, run_at_ms, progress)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id.to_string(),
                serde_json::to_string(&job.config)?,
                job.config_hash,
                job.status.to_db_string(),
                job.attempts_made,
                serde_json::to_string(&job.options)?,
                job.enqueued_at.to_rfc3339(),
                job.run_at.timestamp_millis(),
                serde_json::to_string(&job.progress)?,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: Uuid) -> StorageResult<Option<CrawlJob>> {
        load_job(&self.conn, &id.to_string())
    }

    fn queue_position(&self, id: Uuid) -> StorageResult<Option<u64>> {
        let row: Option<(String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT status, run_at_ms, seq FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((status, run_at_ms, seq)) = row else {
            return Ok(None);
        };
        if status != JobStatus::Pending.to_db_string() {
            return Ok(None);
        }

        let position: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE status = ?1 AND (run_at_ms < ?2 OR (run_at_ms = ?2 AND seq <= ?3))",
            params![JobStatus::Pending.to_db_string(), run_at_ms, seq],
            |row| row.get(0),
        )?;
        Ok(Some(position as u64))
    }

    // ===== Claiming =====

    fn next_run_at(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let ms: Option<i64> = self.conn.query_row(
            "SELECT MIN(run_at_ms) FROM jobs WHERE status = ?1",
            params![JobStatus::Pending.to_db_string()],
            |row| row.get(0),
        )?;
        ms.map(from_millis).transpose()
    }

    fn claim_next(&mut self, now: DateTime<Utc>) -> StorageResult<Option<CrawlJob>> {
        let tx = self.conn.transaction()?;

        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE status = ?1 AND run_at_ms <= ?2
                 ORDER BY run_at_ms, seq LIMIT 1",
                params![JobStatus::Pending.to_db_string(), now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET status = ?1, started_at = ?2 WHERE id = ?3",
            params![JobStatus::Active.to_db_string(), now.to_rfc3339(), id],
        )?;
        let job = load_job(&tx, &id)?;
        tx.commit()?;

        Ok(job)
    }

    fn active_jobs(&self) -> StorageResult<Vec<CrawlJob>> {
        let sql = format!("SELECT {} FROM jobs WHERE status = ?1 ORDER BY seq", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![JobStatus::Active.to_db_string()], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    fn update_progress(&mut self, id: Uuid, progress: &SessionProgress) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE jobs SET progress = ?1 WHERE id = ?2",
            params![serde_json::to_string(progress)?, id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(id));
        }
        Ok(())
    }

    // ===== Finishing attempts =====

    fn complete_job(
        &mut self,
        id: Uuid,
        result: &CrawlJobResult,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, id, JobStatus::Completed)?;
        tx.execute(
            "UPDATE jobs SET status = ?1, attempts_made = attempts_made + 1, finished_at = ?2,
             finished_at_ms = ?3, result = ?4, progress = ?5 WHERE id = ?6",
            params![
                JobStatus::Completed.to_db_string(),
                now.to_rfc3339(),
                now.timestamp_millis(),
                serde_json::to_string(result)?,
                serde_json::to_string(progress)?,
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn retry_job(
        &mut self,
        id: Uuid,
        failure: &JobFailure,
        progress: &SessionProgress,
        run_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, id, JobStatus::Pending)?;
        tx.execute(
            "UPDATE jobs SET status = ?1, attempts_made = attempts_made + 1, run_at_ms = ?2,
             last_error = ?3, progress = ?4 WHERE id = ?5",
            params![
                JobStatus::Pending.to_db_string(),
                run_at.timestamp_millis(),
                serde_json::to_string(failure)?,
                serde_json::to_string(progress)?,
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn fail_job(
        &mut self,
        id: Uuid,
        failure: &JobFailure,
        progress: &SessionProgress,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        check_transition(&tx, id, JobStatus::Failed)?;
        tx.execute(
            "UPDATE jobs SET status = ?1, attempts_made = attempts_made + 1, finished_at = ?2,
             finished_at_ms = ?3, last_error = ?4, progress = ?5 WHERE id = ?6",
            params![
                JobStatus::Failed.to_db_string(),
                now.to_rfc3339(),
                now.timestamp_millis(),
                serde_json::to_string(failure)?,
                serde_json::to_string(progress)?,
                id.to_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ===== Retention and statistics =====

    fn recent_jobs(&self, status: JobStatus, limit: usize) -> StorageResult<Vec<CrawlJob>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = ?1 ORDER BY finished_at_ms DESC, seq DESC LIMIT ?2",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.to_db_string(), limit as i64], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    fn evict_finished(&mut self, status: JobStatus, keep: u32) -> StorageResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM jobs WHERE status = ?1 AND seq NOT IN (
                SELECT seq FROM jobs WHERE status = ?1
                ORDER BY finished_at_ms DESC, seq DESC LIMIT ?2
             )",
            params![status.to_db_string(), keep],
        )?;
        Ok(deleted as u64)
    }

    fn count_by_status(&self, status: JobStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
