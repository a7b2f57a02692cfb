//! Catalog ingestion
//!
//! Harvested book metadata arrives as already-extracted `{title, author}`
//! records and is submitted to the catalog API over HTTP, one request per
//! record.

pub mod client;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::IngestClient;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API responded with status code: {0}")]
    Status(u16),

    #[error("Failed to read source: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse source: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A harvested book as sent to `POST /books`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub author: String,
}

impl BookRecord {
    /// Records missing a title or author are not worth a round trip
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty() && !self.author.trim().is_empty()
    }
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Read a JSON array of records from `path`
pub async fn load_records(path: impl AsRef<Path>) -> Result<Vec<BookRecord>, IngestError> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_records_detected() {
        let blank_author = BookRecord {
            title: "Dune".into(),
            author: "  ".into(),
        };
        assert!(!blank_author.is_complete());
        assert!(BookRecord {
            title: "Dune".into(),
            author: "Frank Herbert".into(),
        }
        .is_complete());
    }

    #[tokio::test]
    async fn test_load_records_rejects_malformed_source() {
        let path = std::env::temp_dir().join(format!("bookshelf-ingest-{}.json", std::process::id()));
        tokio::fs::write(&path, b"{\"title\": \"not an array\"}").await.unwrap();

        let err = load_records(&path).await.unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));

        tokio::fs::remove_file(&path).await.ok();
    }
}
