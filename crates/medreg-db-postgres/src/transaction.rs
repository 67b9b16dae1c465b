//! PostgreSQL transaction implementation.
//!
//! Counter rows and patient rows are locked with `SELECT ... FOR UPDATE`, so
//! the database itself serializes concurrent allocators on the same prefix.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx_postgres::PgTransaction;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use medreg_core::{NewPatient, Patient, PatientCodes, Prefix};
use medreg_storage::{CounterStore, RegistryTransaction, StorageError, counter_key};

use crate::queries;

/// PostgreSQL transaction wrapper.
///
/// The transaction rolls back on drop if not explicitly committed.
pub struct PostgresTransaction {
    /// `None` once committed or rolled back.
    tx: Mutex<Option<Box<PgTransaction<'static>>>>,
    /// Row keys locked by this transaction.
    locked: HashSet<String>,
}

impl PostgresTransaction {
    pub fn new(tx: PgTransaction<'static>) -> Self {
        Self {
            tx: Mutex::new(Some(Box::new(tx))),
            locked: HashSet::new(),
        }
    }

    fn open<'a>(
        tx: &'a mut Mutex<Option<Box<PgTransaction<'static>>>>,
    ) -> Result<&'a mut PgTransaction<'static>, StorageError> {
        tx.get_mut().as_deref_mut().ok_or_else(|| {
            StorageError::transaction_error("Transaction already completed (committed or rolled back)")
        })
    }

    fn require_lock(&self, key: &str) -> Result<(), StorageError> {
        if self.locked.contains(key) {
            Ok(())
        } else {
            Err(StorageError::transaction_error(format!(
                "{key} must be locked before it is written"
            )))
        }
    }
}

#[async_trait]
impl CounterStore for PostgresTransaction {
    async fn lock_and_read(&mut self, prefix: &Prefix) -> Result<i64, StorageError> {
        let tx = Self::open(&mut self.tx)?;
        let value = queries::counter::lock_and_read(&mut **tx, prefix).await?;
        self.locked.insert(counter_key(prefix));
        debug!(%prefix, value, "counter row locked");
        Ok(value)
    }

    async fn write(&mut self, prefix: &Prefix, value: i64) -> Result<(), StorageError> {
        self.require_lock(&counter_key(prefix))?;
        let tx = Self::open(&mut self.tx)?;
        queries::counter::write(&mut **tx, prefix, value).await
    }
}

#[async_trait]
impl RegistryTransaction for PostgresTransaction {
    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.get_mut().take() {
            tx.commit()
                .await
                .map_err(|e| crate::error::map_sqlx_error(e, "commit"))?;
            debug!(rows = self.locked.len(), "Transaction committed successfully");
        }
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.get_mut().take() {
            tx.rollback().await.map_err(|e| {
                StorageError::transaction_error(format!("Failed to rollback transaction: {e}"))
            })?;
            debug!("Transaction rolled back successfully");
        }
        Ok(())
    }

    async fn user_exists(&mut self, user_id: i64) -> Result<bool, StorageError> {
        let tx = Self::open(&mut self.tx)?;
        queries::patient::user_exists(&mut **tx, user_id).await
    }

    async fn insert_patient(
        &mut self,
        patient: &NewPatient,
        codes: &PatientCodes,
    ) -> Result<Patient, StorageError> {
        patient
            .check_required()
            .map_err(|e| StorageError::invalid_record(e.to_string()))?;

        let tx = Self::open(&mut self.tx)?;
        let stored = queries::patient::insert(&mut **tx, patient, codes).await?;
        // An inserted row is locked by its inserting transaction.
        self.locked.insert(format!("patient/{}", stored.id));
        Ok(stored)
    }

    async fn lock_patient(&mut self, id: i64) -> Result<Option<Patient>, StorageError> {
        let tx = Self::open(&mut self.tx)?;
        let patient = queries::patient::lock(&mut **tx, id).await?;
        if patient.is_some() {
            self.locked.insert(format!("patient/{id}"));
        }
        Ok(patient)
    }

    async fn update_patient(&mut self, patient: &Patient) -> Result<Patient, StorageError> {
        self.require_lock(&format!("patient/{}", patient.id))?;
        let tx = Self::open(&mut self.tx)?;
        queries::patient::update(&mut **tx, patient).await
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            // sqlx issues the ROLLBACK when the inner transaction drops.
            warn!("PostgresTransaction dropped without explicit commit/rollback - will auto-rollback");
        }
    }
}
