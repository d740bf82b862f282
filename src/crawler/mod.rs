//! Crawler module for page traversal and extraction
//!
//! This module contains the per-job crawling logic, including:
//! - The page driver abstraction and the shared page pool
//! - A static HTML driver backed by reqwest and scraper
//! - The frontier with enqueue-time deduplication
//! - Listing pagination and product extraction
//! - The crawl session that ties them together

mod driver;
mod extractor;
mod frontier;
mod pagination;
mod session;
mod static_driver;

pub use driver::{DriverError, DriverResult, Page, PageDriver, PagePool, PooledPage};
pub use extractor::{
    extract_product, store_raw_content, ExtractionError, ExtractionRules, PersistError,
    ProductRecord,
};
pub use frontier::{Frontier, FrontierEntry, CONTINUATION_PRIORITY, DISCOVERED_PRIORITY};
pub use pagination::{dismiss_consent, AdvanceStep, PaginationController};
pub use session::{CrawlSession, SessionError, SessionProgress};
pub use static_driver::{
    build_http_client, DocumentFetcher, FetchedDocument, HttpFetcher, StaticPage,
    StaticPageDriver,
};
