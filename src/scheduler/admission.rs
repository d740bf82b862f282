//! Admission window for job starts
//!
//! Caps how many jobs may start within a sliding time window, on top of the
//! worker count that caps how many run at once.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding window of recent job starts
#[derive(Debug)]
pub struct AdmissionWindow {
    /// Starts allowed per window
    limit: usize,

    window: Duration,

    /// Start times inside the current window, oldest first
    starts: VecDeque<Instant>,
}

impl AdmissionWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            starts: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.starts.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until another start is allowed, zero if allowed now
    pub fn time_until_slot(&mut self, now: Instant) -> Duration {
        self.prune(now);

        if self.starts.len() < self.limit {
            return Duration::ZERO;
        }

        match self.starts.front() {
            Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Sleeps until another start is allowed
    pub async fn wait_for_slot(&mut self) {
        loop {
            let wait = self.time_until_slot(Instant::now());
            if wait.is_zero() {
                return;
            }
            tracing::debug!("admission window full, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Records a job start
    pub fn record_start(&mut self, now: Instant) {
        self.prune(now);
        self.starts.push_back(now);
    }

    /// Starts counted in the current window
    pub fn recent_starts(&self) -> usize {
        self.starts.len()
    }
}
