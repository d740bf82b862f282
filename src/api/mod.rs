//! HTTP API
//!
//! A thin axum layer over the `JobScheduler`. Handlers never wait for a
//! crawl to finish: submission returns as soon as the job is queued.

mod handlers;

pub use handlers::*;

use crate::config::ValidationError;
use crate::scheduler::JobScheduler;
use crate::HarvestError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Shared handler state
pub type AppState = Arc<JobScheduler>;

/// Builds the API router
pub fn router(scheduler: AppState) -> Router {
    Router::new()
        .route("/crawl", post(submit_crawl))
        .route("/crawl/jobs", get(list_jobs))
        .route("/crawl/:job_id", get(job_status))
        .route("/health", get(health_handler))
        .with_state(scheduler)
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Errors mapped to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// The submitted config was rejected (400)
    Validation(ValidationError),
    /// The request body could not be read as a config (400)
    MalformedConfig(String),
    NotFound(String),
    /// The scheduler is stopping (503)
    Unavailable,
    Internal(String),
}

impl From<HarvestError> for ApiError {
    fn from(e: HarvestError) -> Self {
        match e {
            HarvestError::Validation(v) => ApiError::Validation(v),
            HarvestError::JobNotFound(id) => ApiError::NotFound(format!("job {} not found", id)),
            HarvestError::ShuttingDown => ApiError::Unavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: v.code.as_str().to_string(),
                    message: v.message,
                    details: v.details,
                },
            ),
            ApiError::MalformedConfig(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "MISSING_CONFIG".to_string(),
                    message: "request body is not a crawl configuration".to_string(),
                    details: vec![reason],
                },
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "NOT_FOUND".to_string(),
                    message,
                    details: Vec::new(),
                },
            ),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "SHUTTING_DOWN".to_string(),
                    message: "scheduler is shutting down".to_string(),
                    details: Vec::new(),
                },
            ),
            ApiError::Internal(message) => {
                tracing::error!("API request failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "INTERNAL_ERROR".to_string(),
                        message,
                        details: Vec::new(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
