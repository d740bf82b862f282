//! Job scheduler
//!
//! Owns the durable job store and a fixed pool of workers. Each worker
//! claims the next ready job, runs it through the `JobRunner`, and records
//! the outcome: completed, re-queued with exponential backoff, or failed
//! once its attempts are used up.
//!
//! Limits enforced here:
//! - At most `max-concurrent-jobs` jobs are active at once (one per worker)
//! - At most `admission-limit` jobs start per admission window
//! - Each attempt runs under a wall-clock timeout

mod admission;
mod events;
mod job;
mod runner;

pub use admission::AdmissionWindow;
pub use events::{JobObserver, TracingObserver};
pub use job::{BackoffPolicy, ErrorCode, JobFailure, JobOptions};
pub use runner::{JobRunner, SessionRunner};

use crate::config::{crawler_config_hash, validate_crawler_config, Config, CrawlerConfig, SchedulerConfig};
use crate::crawler::{HttpFetcher, PageDriver, PagePool, SessionProgress, StaticPageDriver};
use crate::output::CrawlJobResult;
use crate::state::JobStatus;
use crate::storage::{
    open_job_store, BlobStore, CrawlJob, FsBlobStore, JobStore, StorageError, StorageResult,
};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Minimum time between progress writes for a running job
const PROGRESS_SAVE_INTERVAL: Duration = Duration::from_millis(250);

/// Reply to a successful submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// 1-based position among pending jobs
    pub queue_position: Option<u64>,
}

/// Snapshot of one job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub id: Uuid,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub run_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<CrawlJobResult>,
    pub last_error: Option<JobFailure>,
    pub progress: SessionProgress,
}

impl JobStatusView {
    fn from_job(job: CrawlJob, live: Option<SessionProgress>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            attempts_made: job.attempts_made,
            max_attempts: job.options.max_attempts,
            enqueued_at: job.enqueued_at,
            run_at: job.run_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            result: job.result,
            last_error: job.last_error,
            progress: live.unwrap_or(job.progress),
        }
    }

    /// Time the job last changed state
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.finished_at
            .or(self.started_at)
            .unwrap_or(self.enqueued_at)
    }
}

/// Most recently finished jobs, newest first
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentJobs {
    pub completed: Vec<JobStatusView>,
    pub failed: Vec<JobStatusView>,
}

/// Job counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

/// State shared by the scheduler handle and its workers
struct Inner {
    store: Mutex<Box<dyn JobStore>>,
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
    observers: RwLock<Vec<Arc<dyn JobObserver>>>,
    admission: tokio::sync::Mutex<AdmissionWindow>,
    /// Wakes an idle worker when a job is submitted
    wake: Notify,
    shutdown: CancellationToken,
    /// Progress receivers for jobs running in this process
    live: Mutex<HashMap<Uuid, watch::Receiver<SessionProgress>>>,
}

/// Durable crawl job queue with a worker pool
pub struct JobScheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pool: Option<Arc<PagePool>>,
}

impl JobScheduler {
    /// Creates a scheduler over the given store and runner
    ///
    /// Workers are not spawned until `start` is called.
    pub fn new(store: Box<dyn JobStore>, runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> Self {
        let admission = AdmissionWindow::new(
            config.admission_limit(),
            Duration::from_millis(config.admission_window_ms),
        );
        let observers: Vec<Arc<dyn JobObserver>> = vec![Arc::new(TracingObserver)];

        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(store),
                runner,
                config,
                observers: RwLock::new(observers),
                admission: tokio::sync::Mutex::new(admission),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                live: Mutex::new(HashMap::new()),
            }),
            workers: Mutex::new(Vec::new()),
            pool: None,
        }
    }

    /// Builds the production scheduler: SQLite jobs, filesystem blobs and
    /// the static HTML page driver
    pub fn from_config(config: &Config) -> Result<Self, HarvestError> {
        let store = open_job_store(Path::new(&config.storage.database_path))?;
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.storage.blob_dir));

        let fetcher = HttpFetcher::from_config(&config.driver)?;
        let driver: Arc<dyn PageDriver> = Arc::new(StaticPageDriver::new(Arc::new(fetcher)));
        let pool_size = config.driver.pool_size.unwrap_or(
            config.scheduler.max_concurrent_jobs * config.session.page_concurrency,
        );
        let pool = Arc::new(PagePool::new(driver, pool_size));
        tracing::debug!("page pool size: {}", pool.size());

        let runner = SessionRunner::new(Arc::clone(&pool), blobs, config.session.clone());

        let mut scheduler = Self::new(Box::new(store), Arc::new(runner), config.scheduler.clone());
        scheduler.pool = Some(pool);
        Ok(scheduler)
    }

    /// Registers an observer for job state changes
    pub fn subscribe(&self, observer: Arc<dyn JobObserver>) {
        match self.inner.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    /// Recovers stalled jobs and spawns the workers
    ///
    /// Jobs left active by a previous process count as failed attempts with
    /// code `STALLED` and are retried or finalized like any other failure.
    /// Calling `start` again is a no-op.
    pub fn start(&self) -> Result<(), HarvestError> {
        let mut workers = self.workers.lock().map_err(|_| StorageError::Poisoned)?;
        if !workers.is_empty() {
            return Ok(());
        }

        let recovered = self.inner.recover_stalled()?;
        if recovered > 0 {
            tracing::warn!("Recovered {} stalled jobs", recovered);
        }

        let worker_count = self.inner.config.max_concurrent_jobs.max(1);
        for worker_id in 0..worker_count {
            let inner = Arc::clone(&self.inner);
            workers.push(tokio::spawn(async move {
                inner.worker_loop(worker_id).await;
            }));
        }

        tracing::info!("Scheduler started with {} workers", worker_count);
        Ok(())
    }

    /// Validates and enqueues a crawl configuration
    ///
    /// An invalid configuration is rejected before anything is written.
    pub fn submit(&self, config: CrawlerConfig) -> Result<SubmittedJob, HarvestError> {
        validate_crawler_config(&config)?;

        if self.inner.shutdown.is_cancelled() {
            return Err(HarvestError::ShuttingDown);
        }

        let config_hash = crawler_config_hash(&config)?;
        let job = CrawlJob::new(config, config_hash, JobOptions::from_config(&self.inner.config));
        let id = job.id;

        let queue_position = self.inner.with_store(|store| {
            store.insert_job(&job)?;
            self.inner.emit(id, None, JobStatus::Pending);
            store.queue_position(id)
        })?;

        self.inner.wake.notify_one();

        Ok(SubmittedJob {
            id,
            status: JobStatus::Pending,
            queue_position,
        })
    }

    /// Current state of a job, with live progress if it is running here
    pub fn status(&self, id: Uuid) -> Result<JobStatusView, HarvestError> {
        let job = self
            .inner
            .with_store(|store| store.get_job(id))?
            .ok_or(HarvestError::JobNotFound(id))?;
        let live = self.inner.live_progress(id);
        Ok(JobStatusView::from_job(job, live))
    }

    /// Up to `limit` most recently finished jobs of each terminal status
    pub fn list_recent(&self, limit: usize) -> Result<RecentJobs, HarvestError> {
        let (completed, failed) = self.inner.with_store(|store| {
            Ok((
                store.recent_jobs(JobStatus::Completed, limit)?,
                store.recent_jobs(JobStatus::Failed, limit)?,
            ))
        })?;

        Ok(RecentJobs {
            completed: completed
                .into_iter()
                .map(|job| JobStatusView::from_job(job, None))
                .collect(),
            failed: failed
                .into_iter()
                .map(|job| JobStatusView::from_job(job, None))
                .collect(),
        })
    }

    pub fn counts(&self) -> Result<JobCounts, HarvestError> {
        let counts = self.inner.with_store(|store| {
            Ok(JobCounts {
                pending: store.count_by_status(JobStatus::Pending)?,
                active: store.count_by_status(JobStatus::Active)?,
                completed: store.count_by_status(JobStatus::Completed)?,
                failed: store.count_by_status(JobStatus::Failed)?,
            })
        })?;
        Ok(counts)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stops the workers and waits for them to exit
    ///
    /// Attempts still running are abandoned and left active in the store;
    /// the next `start` recovers them as stalled.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down scheduler");
        self.inner.shutdown.cancel();

        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        if let Some(pool) = &self.pool {
            pool.close();
        }
        tracing::info!("Scheduler stopped");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut dyn JobStore) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut store = self.store.lock().map_err(|_| StorageError::Poisoned)?;
        f(&mut **store)
    }

    fn emit(&self, job_id: Uuid, from: Option<JobStatus>, to: JobStatus) {
        let observers = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in &observers {
            observer.on_state_change(job_id, from, to);
        }
    }

    fn live_progress(&self, id: Uuid) -> Option<SessionProgress> {
        let live = self.live.lock().ok()?;
        live.get(&id).map(|rx| *rx.borrow())
    }

    fn set_live(&self, id: Uuid, rx: Option<watch::Receiver<SessionProgress>>) {
        if let Ok(mut live) = self.live.lock() {
            match rx {
                Some(rx) => {
                    live.insert(id, rx);
                }
                None => {
                    live.remove(&id);
                }
            }
        }
    }

    fn recover_stalled(&self) -> StorageResult<usize> {
        let stalled = self.with_store(|store| store.active_jobs())?;
        for job in &stalled {
            tracing::warn!(job_id = %job.id, "job was left active by a previous run");
            self.record_failure(job, &JobFailure::stalled(), job.progress)?;
        }
        Ok(stalled.len())
    }

    async fn worker_loop(&self, worker_id: usize) {
        tracing::debug!(worker = worker_id, "worker started");

        while !self.shutdown.is_cancelled() {
            match self.claim_next().await {
                Ok(Some(job)) => {
                    tracing::debug!(worker = worker_id, job_id = %job.id, "claimed job");
                    self.run_job(job).await;
                }
                Ok(None) => self.idle().await,
                Err(e) => {
                    tracing::error!(worker = worker_id, "Failed to claim job: {}", e);
                    self.idle().await;
                }
            }
        }

        tracing::debug!(worker = worker_id, "worker stopped");
    }

    /// Claims the next ready job once the admission window allows a start
    async fn claim_next(&self) -> StorageResult<Option<CrawlJob>> {
        let mut admission = self.admission.lock().await;

        let ready = self
            .with_store(|store| store.next_run_at())?
            .is_some_and(|run_at| run_at <= Utc::now());
        if !ready {
            return Ok(None);
        }

        tokio::select! {
            _ = admission.wait_for_slot() => {}
            _ = self.shutdown.cancelled() => return Ok(None),
        }

        let job = self.with_store(|store| {
            let job = store.claim_next(Utc::now())?;
            if let Some(job) = &job {
                self.emit(job.id, Some(JobStatus::Pending), JobStatus::Active);
            }
            Ok(job)
        })?;
        if job.is_some() {
            admission.record_start(tokio::time::Instant::now());
        }
        Ok(job)
    }

    /// Sleeps until the next job is due, a submission arrives, or the poll
    /// interval passes
    async fn idle(&self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let wait = match self.with_store(|store| store.next_run_at()) {
            Ok(Some(run_at)) => (run_at - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(poll),
            _ => poll,
        };

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.wake.notified() => {}
            _ = self.shutdown.cancelled() => {}
        }
    }

    async fn run_job(&self, job: CrawlJob) {
        let job_id = job.id;
        tracing::info!(
            job_id = %job_id,
            attempt = job.attempts_made + 1,
            max_attempts = job.options.max_attempts,
            "running crawl job"
        );

        let (tx, rx) = watch::channel(SessionProgress::default());
        self.set_live(job_id, Some(rx.clone()));

        let limit = Duration::from_secs(self.config.job_timeout_secs);
        let attempt = tokio::time::timeout(limit, self.runner.run(job_id, job.config.clone(), tx));
        let outcome = tokio::select! {
            result = attempt => Some(result),
            _ = self.shutdown.cancelled() => None,
            _ = self.persist_progress(job_id, rx.clone()) => None,
        };

        let progress = *rx.borrow();
        self.set_live(job_id, None);

        let result = match outcome {
            None => {
                tracing::warn!(job_id = %job_id, "shutdown interrupted a running job");
                return;
            }
            Some(Ok(Ok(result))) => Ok(result),
            Some(Ok(Err(e))) => Err(JobFailure::crawl_failed(&e)),
            Some(Err(_)) => Err(JobFailure::timeout(limit)),
        };

        if let Err(e) = self.finish_attempt(&job, progress, result) {
            tracing::error!(job_id = %job_id, "Failed to record job outcome: {}", e);
        }
    }

    /// Writes progress to the store as it changes, at most once per interval
    ///
    /// Never completes, so it only ends when the attempt does.
    async fn persist_progress(&self, job_id: Uuid, mut rx: watch::Receiver<SessionProgress>) {
        while rx.changed().await.is_ok() {
            let progress = *rx.borrow_and_update();
            if let Err(e) = self.with_store(|store| store.update_progress(job_id, &progress)) {
                tracing::debug!(job_id = %job_id, "Failed to save progress: {}", e);
            }
            tokio::time::sleep(PROGRESS_SAVE_INTERVAL).await;
        }
        std::future::pending::<()>().await
    }

    fn finish_attempt(
        &self,
        job: &CrawlJob,
        progress: SessionProgress,
        outcome: Result<CrawlJobResult, JobFailure>,
    ) -> StorageResult<()> {
        match outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %job.id,
                    items = result.processed_items,
                    pages = result.metadata.pages_visited,
                    "crawl job finished"
                );
                let evicted = self.with_store(|store| {
                    store.complete_job(job.id, &result, &progress, Utc::now())?;
                    self.emit(job.id, Some(JobStatus::Active), JobStatus::Completed);
                    store.evict_finished(JobStatus::Completed, self.config.keep_completed)
                })?;
                if evicted > 0 {
                    tracing::debug!("Evicted {} completed jobs", evicted);
                }
                Ok(())
            }
            Err(failure) => self.record_failure(job, &failure, progress),
        }
    }

    /// Re-queues the job with backoff, or fails it when no attempts remain
    fn record_failure(
        &self,
        job: &CrawlJob,
        failure: &JobFailure,
        progress: SessionProgress,
    ) -> StorageResult<()> {
        let attempt = job.attempts_made + 1;
        let now = Utc::now();

        if job.has_attempts_left() {
            let delay = job.options.backoff().delay(attempt);
            let run_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            tracing::warn!(
                job_id = %job.id,
                attempt,
                max_attempts = job.options.max_attempts,
                "attempt failed ({}), retrying in {:?}",
                failure,
                delay
            );
            self.with_store(|store| {
                store.retry_job(job.id, failure, &progress, run_at)?;
                self.emit(job.id, Some(JobStatus::Active), JobStatus::Pending);
                Ok(())
            })?;
        } else {
            tracing::error!(
                job_id = %job.id,
                attempts = attempt,
                "job failed: {}",
                failure
            );
            let evicted = self.with_store(|store| {
                store.fail_job(job.id, failure, &progress, now)?;
                self.emit(job.id, Some(JobStatus::Active), JobStatus::Failed);
                store.evict_finished(JobStatus::Failed, self.config.keep_failed)
            })?;
            if evicted > 0 {
                tracing::debug!("Evicted {} failed jobs", evicted);
            }
        }

        Ok(())
    }
}
