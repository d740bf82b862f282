use crate::api::{ApiError, AppState};
use crate::config::CrawlerConfig;
use crate::crawler::SessionProgress;
use crate::output::CrawlJobResult;
use crate::scheduler::{JobFailure, JobStatusView};
use crate::state::JobStatus;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    #[serde(rename = "queuePosition")]
    pub queue_position: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Attempts {
    pub total: u32,
    pub max: u32,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub state: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CrawlJobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub progress: SessionProgress,
    pub attempts: Attempts,
}

impl From<JobStatusView> for JobStatusResponse {
    fn from(view: JobStatusView) -> Self {
        Self {
            job_id: view.id,
            state: view.status,
            result: view.result,
            error: view.last_error,
            progress: view.progress,
            attempts: Attempts {
                total: view.attempts_made,
                max: view.max_attempts,
            },
        }
    }
}

/// One finished job in the recent-jobs listing
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CrawlJobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl From<JobStatusView> for JobSummary {
    fn from(view: JobStatusView) -> Self {
        Self {
            id: view.id,
            timestamp: view.timestamp(),
            result: view.result,
            error: view.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecentJobsResponse {
    pub completed: Vec<JobSummary>,
    pub failed: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active: u64,
    pub pending: u64,
}

/// Queues a crawl job
///
/// Returns as soon as the job is stored; poll `GET /crawl/{id}` for the
/// outcome.
pub async fn submit_crawl(
    State(scheduler): State<AppState>,
    payload: Result<Json<CrawlerConfig>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(config) = payload.map_err(|e| ApiError::MalformedConfig(e.body_text()))?;

    let submitted = scheduler.submit(config)?;

    Ok(Json(SubmitResponse {
        job_id: submitted.id,
        status: submitted.status,
        message: "crawl job queued".to_string(),
        queue_position: submitted.queue_position,
    }))
}

/// Reports one job's state
pub async fn job_status(
    State(scheduler): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::NotFound(format!("job {} not found", job_id)))?;

    let view = scheduler.status(id)?;
    Ok(Json(view.into()))
}

/// Lists recently finished jobs, newest first
pub async fn list_jobs(
    State(scheduler): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<RecentJobsResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let recent = scheduler.list_recent(limit)?;
    Ok(Json(RecentJobsResponse {
        completed: recent.completed.into_iter().map(JobSummary::from).collect(),
        failed: recent.failed.into_iter().map(JobSummary::from).collect(),
    }))
}

pub async fn health_handler(
    State(scheduler): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let counts = scheduler.counts()?;
    let status = if scheduler.is_shutting_down() {
        "stopping"
    } else {
        "ok"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        active: counts.active,
        pending: counts.pending,
    }))
}
