//! Integration tests for the job scheduler
//!
//! Jobs run through scripted runners so attempt counts, timing and
//! concurrency can be observed directly.

use async_trait::async_trait;
use catalog_harvester::config::{CrawlerConfig, SchedulerConfig, SelectorConfig, ValidationCode};
use catalog_harvester::crawler::{SessionError, SessionProgress};
use catalog_harvester::output::{CrawlJobResult, ResultMetadata};
use catalog_harvester::scheduler::{ErrorCode, JobObserver, JobRunner, JobScheduler};
use catalog_harvester::storage::{JobStore, SqliteJobStore};
use catalog_harvester::{HarvestError, JobStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

fn valid_config() -> CrawlerConfig {
    CrawlerConfig {
        start_urls: vec!["https://www.shop.test/list".to_string()],
        listing_patterns: vec!["https://www.shop.test/list".to_string()],
        product_patterns: vec!["https://www.shop-items.test/p".to_string()],
        selectors: SelectorConfig {
            product_card: ".card".to_string(),
            pagination: ".next".to_string(),
            product_link: ".card a".to_string(),
            product_name: "h1".to_string(),
            product_price: ".price".to_string(),
        },
        ..Default::default()
    }
}

fn empty_result() -> CrawlJobResult {
    CrawlJobResult {
        processed_items: 0,
        metadata: ResultMetadata::default(),
        items: Vec::new(),
    }
}

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval_ms: 10,
        backoff_base_ms: 50,
        admission_limit: Some(100),
        ..Default::default()
    }
}

fn scheduler_with(runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> JobScheduler {
    let store = SqliteJobStore::new_in_memory().unwrap();
    JobScheduler::new(Box::new(store), runner, config)
}

async fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(limit, async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Records when each attempt starts, then behaves as configured
struct ScriptedRunner {
    starts: Mutex<Vec<Instant>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    behaviour: Behaviour,
}

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    SucceedAfter(Duration),
    Fail,
    Hang,
    ReportThenHang(SessionProgress),
}

impl ScriptedRunner {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            starts: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            behaviour,
        })
    }

    fn starts(&self) -> Vec<Instant> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(
        &self,
        _job_id: Uuid,
        _config: CrawlerConfig,
        progress: watch::Sender<SessionProgress>,
    ) -> Result<CrawlJobResult, SessionError> {
        self.starts.lock().unwrap().push(Instant::now());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let outcome = match self.behaviour {
            Behaviour::Succeed => Ok(empty_result()),
            Behaviour::SucceedAfter(delay) => {
                progress.send_replace(SessionProgress {
                    pages_visited: 1,
                    products_extracted: 0,
                    frontier_size: 0,
                });
                tokio::time::sleep(delay).await;
                Ok(empty_result())
            }
            Behaviour::Fail => Err(SessionError::TaskFailed("site unreachable".to_string())),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::ReportThenHang(report) => {
                progress.send_replace(report);
                std::future::pending().await
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Tracks how many jobs are active according to state change events
#[derive(Default)]
struct ActiveCounter {
    active: AtomicUsize,
    peak: AtomicUsize,
    transitions: Mutex<Vec<(Uuid, Option<JobStatus>, JobStatus)>>,
}

impl JobObserver for ActiveCounter {
    fn on_state_change(&self, job_id: Uuid, from: Option<JobStatus>, to: JobStatus) {
        if to == JobStatus::Active {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
        } else if from == Some(JobStatus::Active) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.transitions.lock().unwrap().push((job_id, from, to));
    }
}

#[tokio::test]
async fn test_failing_job_retried_with_backoff() {
    let runner = ScriptedRunner::new(Behaviour::Fail);
    let scheduler = scheduler_with(
        runner.clone(),
        SchedulerConfig {
            max_attempts: 3,
            backoff_base_ms: 200,
            ..fast_config()
        },
    );
    scheduler.start().unwrap();

    let job = scheduler.submit(valid_config()).unwrap();
    wait_until(Duration::from_secs(5), || {
        scheduler.status(job.id).unwrap().status == JobStatus::Failed
    })
    .await;

    let starts = runner.starts();
    assert_eq!(starts.len(), 3);

    let first_gap = starts[1] - starts[0];
    let second_gap = starts[2] - starts[1];
    assert!(first_gap >= Duration::from_millis(180), "{:?}", first_gap);
    assert!(first_gap < Duration::from_millis(600), "{:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(380), "{:?}", second_gap);
    assert!(second_gap < Duration::from_millis(1000), "{:?}", second_gap);

    let view = scheduler.status(job.id).unwrap();
    assert_eq!(view.attempts_made, 3);
    let error = view.last_error.unwrap();
    assert_eq!(error.code, ErrorCode::CrawlFailed);
    assert!(error.message.contains("site unreachable"));

    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_holds() {
    let runner = ScriptedRunner::new(Behaviour::SucceedAfter(Duration::from_millis(50)));
    let scheduler = scheduler_with(
        runner.clone(),
        SchedulerConfig {
            max_concurrent_jobs: 5,
            admission_limit: Some(100),
            ..fast_config()
        },
    );
    let counter = Arc::new(ActiveCounter::default());
    scheduler.subscribe(counter.clone());
    scheduler.start().unwrap();

    for _ in 0..20 {
        scheduler.submit(valid_config()).unwrap();
    }

    wait_until(Duration::from_secs(10), || {
        let counts = scheduler.counts().unwrap();
        assert!(counts.active <= 5, "{} jobs active", counts.active);
        counts.completed == 20
    })
    .await;

    assert!(counter.peak.load(Ordering::SeqCst) <= 5);
    assert!(runner.peak.load(Ordering::SeqCst) <= 5);
    assert_eq!(runner.starts().len(), 20);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_invalid_config_never_enqueued() {
    let runner = ScriptedRunner::new(Behaviour::Succeed);
    let scheduler = scheduler_with(runner.clone(), fast_config());
    scheduler.start().unwrap();

    for _ in 0..3 {
        match scheduler.submit(CrawlerConfig::default()) {
            Err(HarvestError::Validation(e)) => assert_eq!(e.code, ValidationCode::InvalidUrls),
            other => panic!("expected validation error, got {:?}", other.map(|j| j.id)),
        }
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let counts = scheduler.counts().unwrap();
    assert_eq!(counts.pending + counts.active + counts.completed + counts.failed, 0);
    assert!(runner.starts().is_empty());

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_job_timeout_fails_attempt() {
    let runner = ScriptedRunner::new(Behaviour::Hang);
    let scheduler = scheduler_with(
        runner.clone(),
        SchedulerConfig {
            max_attempts: 1,
            job_timeout_secs: 1,
            ..fast_config()
        },
    );
    scheduler.start().unwrap();

    let job = scheduler.submit(valid_config()).unwrap();
    wait_until(Duration::from_secs(5), || {
        scheduler.status(job.id).unwrap().status.is_terminal()
    })
    .await;

    let view = scheduler.status(job.id).unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.last_error.unwrap().code, ErrorCode::Timeout);
    assert_eq!(runner.starts().len(), 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_stalled_job_recovered_on_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");

    let job_id = {
        let hanging = ScriptedRunner::new(Behaviour::Hang);
        let store = SqliteJobStore::new(&db_path).unwrap();
        let scheduler = JobScheduler::new(Box::new(store), hanging, fast_config());
        scheduler.start().unwrap();

        let job = scheduler.submit(valid_config()).unwrap();
        wait_until(Duration::from_secs(5), || {
            scheduler.status(job.id).unwrap().status == JobStatus::Active
        })
        .await;

        scheduler.shutdown().await;
        assert_eq!(scheduler.status(job.id).unwrap().status, JobStatus::Active);
        job.id
    };

    let runner = ScriptedRunner::new(Behaviour::Succeed);
    let store = SqliteJobStore::new(&db_path).unwrap();
    let scheduler = JobScheduler::new(Box::new(store), runner.clone(), fast_config());
    scheduler.start().unwrap();

    wait_until(Duration::from_secs(5), || {
        scheduler.status(job_id).unwrap().status == JobStatus::Completed
    })
    .await;

    let view = scheduler.status(job_id).unwrap();
    assert_eq!(view.attempts_made, 2);
    assert_eq!(view.last_error.unwrap().code, ErrorCode::Stalled);
    assert_eq!(runner.starts().len(), 1);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_running_progress_saved_to_store() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("jobs.db");
    let report = SessionProgress {
        pages_visited: 3,
        products_extracted: 2,
        frontier_size: 5,
    };

    let runner = ScriptedRunner::new(Behaviour::ReportThenHang(report));
    let store = SqliteJobStore::new(&db_path).unwrap();
    let scheduler = JobScheduler::new(Box::new(store), runner, fast_config());
    scheduler.start().unwrap();
    let job = scheduler.submit(valid_config()).unwrap();

    // a second connection sees what another process would read
    let reader = SqliteJobStore::new(&db_path).unwrap();
    wait_until(Duration::from_secs(5), || {
        reader.get_job(job.id).unwrap().map(|j| j.progress) == Some(report)
    })
    .await;

    let stored = reader.get_job(job.id).unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Active);
    assert_eq!(scheduler.status(job.id).unwrap().progress, report);

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_retention_evicts_oldest_completed() {
    let runner = ScriptedRunner::new(Behaviour::Succeed);
    let scheduler = scheduler_with(
        runner.clone(),
        SchedulerConfig {
            max_concurrent_jobs: 1,
            keep_completed: 2,
            ..fast_config()
        },
    );
    scheduler.start().unwrap();

    let ids: Vec<Uuid> = (0..5)
        .map(|_| scheduler.submit(valid_config()).unwrap().id)
        .collect();

    wait_until(Duration::from_secs(5), || runner.starts().len() == 5).await;
    wait_until(Duration::from_secs(5), || {
        let counts = scheduler.counts().unwrap();
        counts.pending == 0 && counts.active == 0
    })
    .await;

    let recent = scheduler.list_recent(10).unwrap();
    let kept: Vec<Uuid> = recent.completed.iter().map(|job| job.id).collect();
    assert_eq!(kept, vec![ids[4], ids[3]]);
    assert!(matches!(
        scheduler.status(ids[0]),
        Err(HarvestError::JobNotFound(_))
    ));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_admission_window_limits_starts() {
    let runner = ScriptedRunner::new(Behaviour::Succeed);
    let scheduler = scheduler_with(
        runner.clone(),
        SchedulerConfig {
            admission_limit: Some(2),
            admission_window_ms: 500,
            ..fast_config()
        },
    );
    scheduler.start().unwrap();

    for _ in 0..3 {
        scheduler.submit(valid_config()).unwrap();
    }

    wait_until(Duration::from_secs(5), || runner.starts().len() == 3).await;

    let starts = runner.starts();
    assert!(starts[2] - starts[0] >= Duration::from_millis(450));

    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_observer_sees_lifecycle() {
    let runner = ScriptedRunner::new(Behaviour::Succeed);
    let scheduler = scheduler_with(runner, fast_config());
    let counter = Arc::new(ActiveCounter::default());
    scheduler.subscribe(counter.clone());
    scheduler.start().unwrap();

    let job = scheduler.submit(valid_config()).unwrap();
    wait_until(Duration::from_secs(5), || {
        scheduler.status(job.id).unwrap().status == JobStatus::Completed
    })
    .await;

    let transitions = counter.transitions.lock().unwrap().clone();
    assert_eq!(
        transitions,
        vec![
            (job.id, None, JobStatus::Pending),
            (job.id, Some(JobStatus::Pending), JobStatus::Active),
            (job.id, Some(JobStatus::Active), JobStatus::Completed),
        ]
    );

    scheduler.shutdown().await;
}
