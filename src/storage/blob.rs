//! Raw page content storage
//!
//! Product pages are stored whole under a time-partitioned key so that
//! extraction can be re-run later without crawling again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while storing blobs
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

/// Write-only store for raw page content
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `content` under `key`, replacing anything already there
    async fn put(&self, key: &str, content: &[u8], content_type: &str) -> Result<(), BlobError>;
}

/// Generates a unique key for a product page captured at `now`
///
/// Keys look like `products/2024/05/17/1715950000123-1a2b3c4d.html`.
pub fn generate_blob_key(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "products/{}/{}-{}.html",
        now.format("%Y/%m/%d"),
        now.timestamp_millis(),
        &suffix[..8]
    )
}

/// Blob store backed by a local directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, content: &[u8], _content_type: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }
}
