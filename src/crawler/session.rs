//! Crawl session: the per-job traversal
//!
//! One session owns the frontier, the visited set, the page budget and the
//! aggregated results. Page visits run as concurrent tasks bounded by the
//! session's page concurrency (and globally by the page pool); each task
//! reports a `PageOutcome` back to the session loop, which is the only writer
//! of session state.

use crate::config::{CrawlerConfig, SessionConfig};
use crate::crawler::driver::{DriverError, DriverResult, Page, PagePool};
use crate::crawler::extractor::{
    extract_product, store_raw_content, ExtractionError, ExtractionRules, ProductRecord,
};
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::crawler::pagination::{AdvanceStep, PaginationController};
use crate::output::{CrawlJobResult, ResultAggregator};
use crate::state::PaginationState;
use crate::storage::BlobStore;
use crate::url::{normalize_against, normalize_url, PatternSet, UrlClass, UrlClassifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;
use uuid::Uuid;

/// Errors that end a session without a result
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("page driver unavailable: {0}")]
    Driver(#[from] DriverError),

    #[error("page task failed: {0}")]
    TaskFailed(String),

    #[error("no usable start URLs")]
    NoStartUrls,
}

/// Live counters published while a session runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub pages_visited: u32,
    pub products_extracted: usize,
    pub frontier_size: usize,
}

/// Read-only state shared with page tasks
struct SessionContext {
    job_id: Uuid,
    config: CrawlerConfig,
    settings: SessionConfig,
    pool: Arc<PagePool>,
    blobs: Arc<dyn BlobStore>,
}

impl SessionContext {
    fn advance_step(&self) -> AdvanceStep<'_> {
        AdvanceStep {
            next_selector: &self.config.selectors.pagination,
            card_selector: &self.config.selectors.product_card,
            consent_selectors: &self.settings.consent_selectors,
            timeout: self.selector_timeout(),
        }
    }

    fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.selector_timeout_ms)
    }
}

/// What a listing visit produced
#[derive(Debug)]
struct ListingVisit {
    /// Page the links were read from, for resolving relative hrefs
    base: Url,
    links: Vec<String>,
    /// Page number and location to continue from
    continuation: Option<(u32, Url)>,
}

/// Message from a page task to the session loop
#[derive(Debug)]
enum PageOutcome {
    Listing {
        entry: FrontierEntry,
        visit: DriverResult<ListingVisit>,
    },
    Product {
        url: Url,
        result: Result<ProductRecord, ExtractionError>,
        storage_failed: bool,
    },
    Unavailable(DriverError),
}

/// Traversal of one crawl job
pub struct CrawlSession {
    ctx: Arc<SessionContext>,
    classifier: UrlClassifier,
    frontier: Frontier,
    aggregator: ResultAggregator,
    page_count: u32,
    max_pages: u32,
    progress: Option<watch::Sender<SessionProgress>>,
}

impl CrawlSession {
    /// Creates a session for one job
    ///
    /// # Arguments
    ///
    /// * `job_id` - The job this session runs for (used in logs)
    /// * `config` - The validated crawl configuration
    /// * `settings` - Service-wide traversal settings
    /// * `pool` - Page contexts shared with other sessions
    /// * `blobs` - Destination for raw product pages
    pub fn new(
        job_id: Uuid,
        config: CrawlerConfig,
        settings: SessionConfig,
        pool: Arc<PagePool>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let classifier = UrlClassifier::new(PatternSet {
            listing: &config.listing_patterns,
            product: &config.product_patterns,
        });
        let max_pages = config.max_pages();

        Self {
            ctx: Arc::new(SessionContext {
                job_id,
                config,
                settings,
                pool,
                blobs,
            }),
            classifier,
            frontier: Frontier::new(),
            aggregator: ResultAggregator::new(),
            page_count: 0,
            max_pages,
            progress: None,
        }
    }

    /// Publishes progress to `sender` while running
    pub fn with_progress(mut self, sender: watch::Sender<SessionProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Runs the traversal to completion
    ///
    /// Page-level failures are counted in the result; only an unavailable
    /// page driver or a crashed page task ends the session with an error.
    /// Dropping the returned future aborts every in-flight page task.
    pub async fn run(mut self) -> Result<CrawlJobResult, SessionError> {
        let started = Instant::now();
        let job_id = self.ctx.job_id;

        self.seed()?;
        tracing::info!(
            job_id = %job_id,
            seeds = self.frontier.len(),
            max_pages = self.max_pages,
            "starting crawl session"
        );

        let concurrency = self.ctx.settings.page_concurrency.max(1);
        let mut in_flight: JoinSet<PageOutcome> = JoinSet::new();
        let mut budget_exhausted = false;

        loop {
            while !budget_exhausted && in_flight.len() < concurrency {
                let Some(entry) = self.frontier.pop() else {
                    break;
                };

                let class = if entry.is_continuation() {
                    UrlClass::Listing
                } else {
                    self.classifier.classify_url(&entry.url)
                };
                if !class.should_visit() {
                    tracing::trace!(job_id = %job_id, url = %entry.url, "ignoring unmatched URL");
                    self.aggregator.record_ignored();
                    continue;
                }

                if self.page_count >= self.max_pages {
                    tracing::info!(job_id = %job_id, max_pages = self.max_pages, "page budget exhausted");
                    budget_exhausted = true;
                    break;
                }

                self.page_count += 1;
                let ctx = Arc::clone(&self.ctx);
                match class {
                    UrlClass::Listing => {
                        in_flight.spawn(visit_listing(ctx, entry));
                    }
                    _ => {
                        in_flight.spawn(visit_product(ctx, entry.url));
                    }
                }
            }

            self.publish_progress();

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let outcome = joined.map_err(|e| SessionError::TaskFailed(e.to_string()))?;
            self.apply(outcome)?;
        }

        self.publish_progress();
        let result = self
            .aggregator
            .finish(self.page_count, budget_exhausted, started.elapsed());

        tracing::info!(
            job_id = %job_id,
            pages = result.metadata.pages_visited,
            distinct_urls = self.frontier.seen_count(),
            products = result.processed_items,
            page_failures = result.metadata.page_failures,
            extraction_failures = result.metadata.extraction_failures,
            duration_ms = result.metadata.duration_ms,
            "crawl session finished"
        );

        Ok(result)
    }

    fn seed(&mut self) -> Result<(), SessionError> {
        let ctx = Arc::clone(&self.ctx);
        for raw in &ctx.config.start_urls {
            match normalize_url(raw) {
                Ok(url) => {
                    if !self.frontier.enqueue(url) {
                        self.aggregator.record_duplicate();
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %ctx.job_id, url = %raw, error = %e, "skipping unusable start URL");
                    self.aggregator.record_ignored();
                }
            }
        }

        if self.frontier.is_empty() {
            return Err(SessionError::NoStartUrls);
        }
        Ok(())
    }

    fn apply(&mut self, outcome: PageOutcome) -> Result<(), SessionError> {
        match outcome {
            PageOutcome::Listing { entry, visit } => match visit {
                Ok(visit) => {
                    self.aggregator.record_listing(false);
                    for href in &visit.links {
                        self.enqueue_link(href, &visit.base);
                    }
                    if let Some((page_number, location)) = visit.continuation {
                        if !self
                            .frontier
                            .enqueue_continuation(entry.url, page_number, location)
                        {
                            self.aggregator.record_duplicate();
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %self.ctx.job_id,
                        url = %entry.url,
                        page = entry.page_number,
                        error = %e,
                        "listing page failed"
                    );
                    self.aggregator.record_listing(true);
                }
            },
            PageOutcome::Product {
                url,
                result,
                storage_failed,
            } => match result {
                Ok(record) => {
                    tracing::debug!(job_id = %self.ctx.job_id, url = %url, "extracted product");
                    self.aggregator.record_product(record, storage_failed);
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.ctx.job_id, url = %url, error = %e, "product extraction failed");
                    self.aggregator.record_extraction_failure(&e);
                }
            },
            PageOutcome::Unavailable(e) => return Err(SessionError::Driver(e)),
        }
        Ok(())
    }

    fn enqueue_link(&mut self, href: &str, base: &Url) {
        match normalize_against(href, Some(base)) {
            Ok(url) => {
                if !self.frontier.enqueue(url) {
                    self.aggregator.record_duplicate();
                }
            }
            Err(_) => self.aggregator.record_ignored(),
        }
    }

    fn publish_progress(&self) {
        if let Some(sender) = &self.progress {
            sender.send_replace(SessionProgress {
                pages_visited: self.page_count,
                products_extracted: self.aggregator.extracted(),
                frontier_size: self.frontier.len(),
            });
        }
    }
}

async fn visit_listing(ctx: Arc<SessionContext>, entry: FrontierEntry) -> PageOutcome {
    let mut page = match ctx.pool.acquire().await {
        Ok(page) => page,
        Err(e) => return PageOutcome::Unavailable(e),
    };
    let visit = load_listing(&mut *page, &ctx, &entry).await;
    PageOutcome::Listing { entry, visit }
}

/// Loads one listing page, collects its links and attempts one advance
async fn load_listing(
    page: &mut dyn Page,
    ctx: &SessionContext,
    entry: &FrontierEntry,
) -> DriverResult<ListingVisit> {
    let selectors = &ctx.config.selectors;
    let step = ctx.advance_step();
    let mut controller = PaginationController::resume(entry.page_number, ctx.config.max_pages());

    match &entry.location {
        // script-driven pagination: the URL never changed, so click back to the page
        Some(location) if *location == entry.url => {
            page.goto(&entry.url).await?;
            if !controller.replay_to(page, entry.page_number, step).await {
                return Err(DriverError::Navigation {
                    url: entry.url.to_string(),
                    message: format!("could not return to page {}", entry.page_number),
                });
            }
        }
        Some(location) => page.goto(location).await?,
        None => page.goto(&entry.url).await?,
    }

    page.wait_for(&selectors.product_card, step.timeout).await?;

    let base = page.location().unwrap_or_else(|| entry.url.clone());
    let mut links = page
        .hrefs(&selectors.product_card, ctx.settings.card_fanout)
        .await?;
    match page
        .hrefs(&selectors.product_link, ctx.settings.product_fanout)
        .await
    {
        Ok(more) => links.extend(more),
        Err(e) => tracing::debug!(url = %base, error = %e, "product link pass failed"),
    }

    // the continuation is deduplicated on the normalized location
    let continuation = match controller.advance(page, step).await {
        PaginationState::OnPage(n) => match page.location() {
            None => Some((n, entry.url.clone())),
            Some(raw) => match normalize_url(raw.as_str()) {
                Ok(location) => Some((n, location)),
                Err(e) => {
                    tracing::debug!(url = %raw, error = %e, "unusable pagination location; listing exhausted");
                    None
                }
            },
        },
        _ => None,
    };

    Ok(ListingVisit {
        base,
        links,
        continuation,
    })
}

async fn visit_product(ctx: Arc<SessionContext>, url: Url) -> PageOutcome {
    let mut page = match ctx.pool.acquire().await {
        Ok(page) => page,
        Err(e) => return PageOutcome::Unavailable(e),
    };

    let rules = ExtractionRules::new(&ctx.config, &ctx.settings);
    let mut storage_failed = false;
    let result = match extract_product(&mut *page, &url, rules).await {
        Ok(mut record) => {
            if let Err(e) = store_raw_content(&mut *page, ctx.blobs.as_ref(), &mut record).await {
                tracing::warn!(job_id = %ctx.job_id, url = %url, error = %e, "failed to store raw product page");
                storage_failed = true;
            }
            Ok(record)
        }
        Err(e) => Err(e),
    };

    PageOutcome::Product {
        url,
        result,
        storage_failed,
    }
}
