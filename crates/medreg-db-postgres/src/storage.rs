//! PostgreSQL implementation of the `RegistryStorage` trait.

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_postgres::PgPool;
use tracing::debug;

use medreg_core::{Patient, Prefix};
use medreg_storage::{RegistryStorage, RegistryTransaction, StorageError};

use crate::config::{PostgresConfig, validate_lock_timeout};
use crate::error::map_sqlx_error;
use crate::transaction::PostgresTransaction;
use crate::{migrations, pool, queries};

/// PostgreSQL storage backend for the patient registry.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PostgresStorage {
    /// Creates a new `PostgresStorage` with the given configuration.
    ///
    /// This will create a connection pool and run migrations (if configured).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self {
            pool,
            lock_timeout_ms: config.lock_timeout_ms,
        })
    }

    /// Creates a new `PostgresStorage` from an existing connection pool.
    ///
    /// Migrations are not run automatically when using this constructor.
    ///
    /// # Errors
    ///
    /// Returns an error if `lock_timeout_ms` is zero.
    pub fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Result<Self, StorageError> {
        validate_lock_timeout(lock_timeout_ms)?;
        Ok(Self {
            pool,
            lock_timeout_ms,
        })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RegistryStorage for PostgresStorage {
    async fn begin_transaction(&self) -> Result<Box<dyn RegistryTransaction>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error(e, "begin"))?;

        // Scoped to this transaction; a statement waiting longer on a row
        // lock fails with 55P03.
        query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(e, "begin"))?;

        debug!(lock_timeout_ms = self.lock_timeout_ms, "Transaction started");
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    async fn read_patient(&self, id: i64) -> Result<Option<Patient>, StorageError> {
        queries::patient::read(&self.pool, id).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StorageError> {
        queries::patient::list(&self.pool).await
    }

    async fn peek_counter(&self, prefix: &Prefix) -> Result<i64, StorageError> {
        queries::counter::peek(&self.pool, prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
