//! Per-job result aggregation
//!
//! Collects extracted records and traversal counters while a session runs,
//! and turns them into the `CrawlJobResult` stored with a completed job.

use crate::crawler::{ExtractionError, ProductRecord};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a completed crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJobResult {
    /// Number of product records extracted
    pub processed_items: usize,
    pub metadata: ResultMetadata,
    pub items: Vec<ProductRecord>,
}

/// Traversal counters for a completed job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Pages dispatched against the page budget
    pub pages_visited: u32,
    pub listing_pages: u32,
    pub product_pages: u32,
    /// Pages that failed to load or never showed their required element
    pub page_failures: u32,
    /// Product pages that loaded but lacked a required field
    pub extraction_failures: u32,
    /// Records whose raw content could not be stored
    pub storage_failures: u32,
    /// Links that were unparseable or matched no pattern
    pub ignored_links: u32,
    pub duplicates_suppressed: u32,
    /// True when the page budget stopped the traversal
    pub budget_exhausted: bool,
    pub duration_ms: u64,
}

/// Running tally for one session
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Vec<ProductRecord>,
    metadata: ResultMetadata,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a listing visit; `failed` when the page never loaded
    pub fn record_listing(&mut self, failed: bool) {
        self.metadata.listing_pages += 1;
        if failed {
            self.metadata.page_failures += 1;
        }
    }

    /// Records an extracted product
    pub fn record_product(&mut self, record: ProductRecord, storage_failed: bool) {
        self.metadata.product_pages += 1;
        if storage_failed {
            self.metadata.storage_failures += 1;
        }
        self.records.push(record);
    }

    /// Records a product page that yielded no record
    pub fn record_extraction_failure(&mut self, error: &ExtractionError) {
        self.metadata.product_pages += 1;
        match error {
            ExtractionError::Page(_) => self.metadata.page_failures += 1,
            ExtractionError::MissingField(_) => self.metadata.extraction_failures += 1,
        }
    }

    pub fn record_ignored(&mut self) {
        self.metadata.ignored_links += 1;
    }

    pub fn record_duplicate(&mut self) {
        self.metadata.duplicates_suppressed += 1;
    }

    /// Records extracted so far
    pub fn extracted(&self) -> usize {
        self.records.len()
    }

    /// Builds the final result
    pub fn finish(self, pages_visited: u32, budget_exhausted: bool, elapsed: Duration) -> CrawlJobResult {
        let metadata = ResultMetadata {
            pages_visited,
            budget_exhausted,
            duration_ms: elapsed.as_millis() as u64,
            ..self.metadata
        };

        CrawlJobResult {
            processed_items: self.records.len(),
            metadata,
            items: self.records,
        }
    }
}
