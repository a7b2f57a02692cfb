//! Bookshelf Server - lending ledger
//!
//! REST API server for a book catalog and its borrow/return ledger.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;

use bookshelf_server::{
    api,
    config::{AppConfig, StorageBackend},
    init_tracing,
    repository::{MemoryGateway, PgGateway, StorageGateway},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Bookshelf Server v{}", env!("CARGO_PKG_VERSION"));

    let mut pg_pool = None;
    let gateway: Arc<dyn StorageGateway> = match config.database.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");
            pg_pool = Some(pool.clone());
            Arc::new(PgGateway::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; records are lost on shutdown");
            Arc::new(MemoryGateway::new())
        }
    };

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState::new(config, gateway);
    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pg_pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
