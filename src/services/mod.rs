//! Business logic services

pub mod catalog;
pub mod ledger;

use std::sync::Arc;

use crate::{config::LedgerConfig, error::AppResult, repository::StorageGateway};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub ledger: ledger::LendingLedger,
    gateway: Arc<dyn StorageGateway>,
}

impl Services {
    /// Create all services over the given storage gateway
    pub fn new(gateway: Arc<dyn StorageGateway>, ledger_config: &LedgerConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(gateway.clone()),
            ledger: ledger::LendingLedger::new(gateway.clone(), ledger_config),
            gateway,
        }
    }

    /// Check that the storage gateway answers
    pub async fn ping_storage(&self) -> AppResult<()> {
        Ok(self.gateway.ping().await?)
    }
}
