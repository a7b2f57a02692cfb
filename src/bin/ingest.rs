//! Catalog ingestion client
//!
//! Reads harvested book records from the configured source file and submits
//! them to the catalog API, once or on a fixed interval.

use std::time::Duration;

use anyhow::Context;

use bookshelf_server::{
    config::AppConfig,
    ingest::{load_records, IngestClient},
    init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    // An explicit path on the command line wins over the configured source.
    let source = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.ingest.source_file.clone());
    let client = IngestClient::new(&config.ingest.api_base_url)?;

    tracing::info!("Ingesting from {} into {}", source, config.ingest.api_base_url);

    match config.ingest.interval_secs {
        None => run_once(&client, &source).await,
        Some(secs) => {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = run_once(&client, &source).await {
                            tracing::error!("Ingestion pass failed: {:#}", e);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Shutdown signal received");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn run_once(client: &IngestClient, source: &str) -> anyhow::Result<()> {
    let records = load_records(source)
        .await
        .with_context(|| format!("Failed to load records from {}", source))?;
    let report = client.submit_all(&records).await;

    if report.failed > 0 {
        tracing::warn!("{} of {} records were not accepted", report.failed, records.len());
    }
    Ok(())
}
