//! Job execution seam
//!
//! The scheduler hands each claimed job to a `JobRunner`. The production
//! runner builds a fresh `CrawlSession` per attempt.

use crate::config::{CrawlerConfig, SessionConfig};
use crate::crawler::{CrawlSession, PagePool, SessionError, SessionProgress};
use crate::output::CrawlJobResult;
use crate::storage::BlobStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Runs one attempt of a crawl job
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Runs the crawl to completion
    ///
    /// The returned future is dropped when the job times out or the
    /// scheduler shuts down.
    async fn run(
        &self,
        job_id: Uuid,
        config: CrawlerConfig,
        progress: watch::Sender<SessionProgress>,
    ) -> Result<CrawlJobResult, SessionError>;
}

/// Runs jobs as crawl sessions over a shared page pool
pub struct SessionRunner {
    pool: Arc<PagePool>,
    blobs: Arc<dyn BlobStore>,
    settings: SessionConfig,
}

impl SessionRunner {
    pub fn new(pool: Arc<PagePool>, blobs: Arc<dyn BlobStore>, settings: SessionConfig) -> Self {
        Self {
            pool,
            blobs,
            settings,
        }
    }
}

#[async_trait]
impl JobRunner for SessionRunner {
    async fn run(
        &self,
        job_id: Uuid,
        config: CrawlerConfig,
        progress: watch::Sender<SessionProgress>,
    ) -> Result<CrawlJobResult, SessionError> {
        CrawlSession::new(
            job_id,
            config,
            self.settings.clone(),
            Arc::clone(&self.pool),
            Arc::clone(&self.blobs),
        )
        .with_progress(progress)
        .run()
        .await
    }
}
