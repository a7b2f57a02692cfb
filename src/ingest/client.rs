//! HTTP client submitting harvested books to the catalog API

use std::time::Duration;

use super::{BookRecord, IngestError, IngestReport};

#[derive(Clone)]
pub struct IngestClient {
    http: reqwest::Client,
    books_url: String,
}

impl IngestClient {
    pub fn new(api_base_url: &str) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            books_url: format!("{}/books", api_base_url.trim_end_matches('/')),
        })
    }

    /// Submit a single record. Any non-success status is an error.
    pub async fn submit(&self, record: &BookRecord) -> Result<(), IngestError> {
        let response = self.http.post(&self.books_url).json(record).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status(status.as_u16()));
        }

        tracing::debug!("Book added to catalog: {} by {}", record.title, record.author);
        Ok(())
    }

    /// Submit every record, logging failures and carrying on with the rest
    pub async fn submit_all(&self, records: &[BookRecord]) -> IngestReport {
        let mut report = IngestReport::default();

        for record in records {
            if !record.is_complete() {
                tracing::warn!("Skipping incomplete record: {:?}", record);
                report.skipped += 1;
                continue;
            }
            match self.submit(record).await {
                Ok(()) => report.submitted += 1,
                Err(e) => {
                    tracing::error!("Error sending book '{}' to API: {}", record.title, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            submitted = report.submitted,
            skipped = report.skipped,
            failed = report.failed,
            "Ingestion pass finished"
        );
        report
    }
}
