//! Bookshelf lending ledger
//!
//! A small REST JSON service tracking a book catalog, registered users and
//! the borrow/return lifecycle linking them. A book's `available` flag never
//! contradicts its open-loan record.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, gateway: Arc<dyn repository::StorageGateway>) -> Self {
        let services = services::Services::new(gateway, &config.ledger);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}

/// Install the global tracing subscriber from the logging configuration.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(logging: &config::LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "bookshelf_server={level},ingest={level},tower_http=debug",
            level = logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
