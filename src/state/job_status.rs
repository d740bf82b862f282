/// Job status definitions for the durable job queue
///
/// A job moves `pending -> active -> completed | failed`, with
/// `active -> pending` when a failed attempt is rescheduled.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue, possibly with a delayed run time
    Pending,

    /// Claimed by a worker and running
    Active,

    /// Finished successfully; result recorded
    Completed,

    /// Exhausted its attempts; last error recorded
    Failed,
}

impl JobStatus {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the job is queued or running
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Checks whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Pending)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all job statuses
    pub fn all_states() -> Vec<Self> {
        vec![Self::Pending, Self::Active, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
