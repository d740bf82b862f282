//! Job options, failures and retry backoff

use crate::config::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why a job attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The crawl session raised an error
    CrawlFailed,
    /// The attempt ran past the job timeout
    Timeout,
    /// The attempt was active when the process stopped
    Stalled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrawlFailed => "CRAWL_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Stalled => "STALLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded for a job attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobFailure {
    pub fn crawl_failed(error: &dyn std::error::Error) -> Self {
        let detail = error.source().map(|source| source.to_string());
        Self {
            code: ErrorCode::CrawlFailed,
            message: error.to_string(),
            detail,
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: format!("crawl exceeded the {}s job timeout", limit.as_secs()),
            detail: None,
        }
    }

    pub fn stalled() -> Self {
        Self {
            code: ErrorCode::Stalled,
            message: "job was running when the service stopped".to_string(),
            detail: None,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Retry settings captured on each job at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_jitter_ms: u64,
}

impl JobOptions {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base_ms: config.backoff_base_ms,
            backoff_jitter_ms: config.backoff_jitter_ms,
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.backoff_base_ms),
            jitter: Duration::from_millis(self.backoff_jitter_ms),
        }
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Exponential retry backoff: `base * 2^(attempt - 1)` plus optional jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub jitter: Duration,
}

impl BackoffPolicy {
    /// Delay before the retry that follows failed attempt number `attempt`
    ///
    /// `attempt` is 1-based; values of 0 are treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base.saturating_mul(1u32 << exponent);

        if self.jitter.is_zero() {
            return delay;
        }

        let jitter_ms = fastrand::u64(0..=self.jitter.as_millis() as u64);
        delay.saturating_add(Duration::from_millis(jitter_ms))
    }
}
