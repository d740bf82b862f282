//! Job state change notifications

use crate::state::JobStatus;
use uuid::Uuid;

/// Receives every job status transition
///
/// Observers are called synchronously while the job store lock is held,
/// right after the transition is recorded, so every observer sees a job's
/// transitions in order. Implementations must not block or call back into
/// the scheduler.
pub trait JobObserver: Send + Sync {
    /// `from` is None when the job was just submitted
    fn on_state_change(&self, job_id: Uuid, from: Option<JobStatus>, to: JobStatus);
}

/// Logs transitions through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_state_change(&self, job_id: Uuid, from: Option<JobStatus>, to: JobStatus) {
        match (from, to) {
            (None, _) => tracing::info!(job_id = %job_id, "job submitted"),
            (Some(_), JobStatus::Active) => tracing::info!(job_id = %job_id, "job started"),
            (Some(_), JobStatus::Completed) => tracing::info!(job_id = %job_id, "job completed"),
            (Some(_), JobStatus::Failed) => tracing::warn!(job_id = %job_id, "job failed"),
            (Some(_), JobStatus::Pending) => tracing::info!(job_id = %job_id, "job requeued for retry"),
        }
    }
}
