pub mod migrate;
pub mod patient;
pub mod sequence;

use std::sync::Arc;

use anyhow::{Context, Result};
use medreg_correlative::CorrelativeAllocator;
use medreg_db_memory::create_storage;
use medreg_db_postgres::PostgresStorage;
use medreg_registry::PatientRegistry;
use medreg_storage::DynStorage;
use tracing::info;

use crate::config::{AppConfig, StorageBackend};

/// Opens the configured storage backend.
pub async fn open_storage(config: &AppConfig) -> Result<DynStorage> {
    let storage: DynStorage = match config.storage.backend {
        StorageBackend::Postgres => {
            let storage = PostgresStorage::new(config.storage.postgres.clone())
                .await
                .context("failed to open PostgreSQL storage")?;
            Arc::new(storage)
        }
        StorageBackend::Memory => create_storage(config.storage.memory.storage_options()),
    };
    info!(backend = storage.backend_name(), "storage ready");
    Ok(storage)
}

/// Builds the registration workflow over the configured storage.
pub async fn open_registry(config: &AppConfig) -> Result<PatientRegistry> {
    let storage = open_storage(config).await?;
    let allocator =
        CorrelativeAllocator::new(config.allocator.clone()).context("invalid allocator config")?;
    Ok(PatientRegistry::new(
        storage,
        allocator,
        config.registry.clone(),
    ))
}
