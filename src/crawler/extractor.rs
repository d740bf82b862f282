//! Product record extraction
//!
//! Extraction is a sequential pipeline over one page context: load, wait for
//! the name, read name and price, then find the EAN by its label. Any
//! missing required field ends the pipeline with an `ExtractionError`.

use crate::config::{CrawlerConfig, SessionConfig};
use crate::crawler::driver::{DriverError, Page};
use crate::storage::{generate_blob_key, BlobError, BlobStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// A product harvested from one product page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub source_url: String,
    pub name: String,
    /// Price text exactly as shown on the page
    pub price: String,
    pub ean: Option<String>,
    pub extracted_at: DateTime<Utc>,
    /// Key of the raw page content in the blob store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

/// Why a product page yielded no record
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("required field '{0}' not found")]
    MissingField(&'static str),

    #[error(transparent)]
    Page(#[from] DriverError),
}

/// Why raw content was not stored
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not read page content: {0}")]
    Content(#[from] DriverError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

/// Where to find each product field
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRules<'a> {
    pub name_selector: &'a str,
    pub price_selector: &'a str,
    pub ean_label: &'a str,
    pub require_ean: bool,
    pub timeout: Duration,
}

impl<'a> ExtractionRules<'a> {
    pub fn new(config: &'a CrawlerConfig, settings: &SessionConfig) -> Self {
        Self {
            name_selector: &config.selectors.product_name,
            price_selector: &config.selectors.product_price,
            ean_label: config.ean_label(),
            require_ean: settings.require_ean,
            timeout: Duration::from_millis(settings.selector_timeout_ms),
        }
    }
}

/// Loads `url` and extracts a product record from it
pub async fn extract_product(
    page: &mut dyn Page,
    url: &Url,
    rules: ExtractionRules<'_>,
) -> Result<ProductRecord, ExtractionError> {
    page.goto(url).await?;
    page.wait_for(rules.name_selector, rules.timeout).await?;

    let name = page
        .text(rules.name_selector)
        .await?
        .ok_or(ExtractionError::MissingField("name"))?;

    let price = page
        .text(rules.price_selector)
        .await?
        .ok_or(ExtractionError::MissingField("price"))?;

    let ean = page.labelled_text(rules.ean_label).await?;
    if ean.is_none() && rules.require_ean {
        return Err(ExtractionError::MissingField("ean"));
    }

    Ok(ProductRecord {
        source_url: url.to_string(),
        name,
        price,
        ean,
        extracted_at: Utc::now(),
        storage_key: None,
    })
}

/// Stores the page's raw content and records the key on `record`
pub async fn store_raw_content(
    page: &mut dyn Page,
    blobs: &dyn BlobStore,
    record: &mut ProductRecord,
) -> Result<(), PersistError> {
    let content = page.content().await?;
    let key = generate_blob_key(record.extracted_at);
    blobs.put(&key, content.as_bytes(), "text/html").await?;
    record.storage_key = Some(key);
    Ok(())
}
