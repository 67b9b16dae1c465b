use std::time::Duration;

use medreg_core::{CorrelativeCode, NewPatient, Patient, PatientCodes, PatientPatch, now_utc};
use medreg_correlative::CorrelativeAllocator;
use medreg_storage::{DynStorage, RegistryTransaction, StorageError};
use tracing::{debug, info, instrument, warn};

use crate::config::RegistryConfig;
use crate::error::RegistryError;

/// The patient registration workflow.
///
/// Owns the transaction boundary: every registration runs the duplicate
/// check, both code allocations and the insert inside one transaction, and
/// commits only once the row is written.
pub struct PatientRegistry {
    storage: DynStorage,
    allocator: CorrelativeAllocator,
    config: RegistryConfig,
}

impl PatientRegistry {
    pub fn new(
        storage: DynStorage,
        allocator: CorrelativeAllocator,
        config: RegistryConfig,
    ) -> Self {
        Self {
            storage,
            allocator,
            config,
        }
    }

    pub fn storage(&self) -> &DynStorage {
        &self.storage
    }

    pub fn allocator(&self) -> &CorrelativeAllocator {
        &self.allocator
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers a patient and assigns its patient and clinical-record codes.
    ///
    /// A user that already has a patient fails with `DuplicateUser` before
    /// any number is drawn. Retryable failures re-run the whole transaction
    /// according to the retry policy.
    #[instrument(skip(self, patient), fields(user_id = patient.user_id))]
    pub async fn register(&self, patient: NewPatient) -> Result<Patient, RegistryError> {
        patient
            .check_required()
            .map_err(|e| RegistryError::InvalidPatient(e.to_string()))?;

        let policy = &self.config.retry;
        let mut attempt = 1;
        loop {
            match self.try_register(&patient).await {
                Ok(created) => {
                    info!(
                        id = created.id,
                        patient_code = %created.patient_code,
                        clinical_record_code = %created.clinical_record_code,
                        attempt,
                        "patient registered"
                    );
                    return Ok(created);
                }
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let backoff_ms = policy.backoff_ms(attempt);
                    warn!(
                        attempt,
                        backoff_ms,
                        category = %e.category(),
                        error = %e,
                        "registration failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, category = %e.category(), error = %e, "registration failed");
                    return Err(e);
                }
            }
        }
    }

    async fn try_register(&self, patient: &NewPatient) -> Result<Patient, RegistryError> {
        let mut tx = self.storage.begin_transaction().await?;

        match self.register_in(&mut *tx, patient).await {
            Ok(created) => {
                tx.commit()
                    .await
                    .map_err(|e| conflict_error(e, patient.user_id))?;
                Ok(created)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    async fn register_in(
        &self,
        tx: &mut dyn RegistryTransaction,
        patient: &NewPatient,
    ) -> Result<Patient, RegistryError> {
        if tx.user_exists(patient.user_id).await? {
            return Err(RegistryError::DuplicateUser {
                user_id: patient.user_id,
            });
        }

        let prefixes = [
            self.config.patient_code_prefix.as_str(),
            self.config.clinical_record_prefix.as_str(),
        ];
        let codes = self.allocator.allocate_many(&prefixes, &mut *tx).await?;
        let [patient_code, clinical_record_code]: [CorrelativeCode; 2] =
            codes.try_into().map_err(|codes: Vec<CorrelativeCode>| {
                StorageError::internal(format!("expected 2 codes, got {}", codes.len()))
            })?;

        let codes = PatientCodes {
            patient_code: patient_code.into_string(),
            clinical_record_code: clinical_record_code.into_string(),
        };
        debug!(?codes, "codes allocated, inserting patient");

        tx.insert_patient(patient, &codes)
            .await
            .map_err(|e| conflict_error(e, patient.user_id))
    }

    /// Allocates a single code in its own transaction and commits it.
    #[instrument(skip(self))]
    pub async fn issue_code(&self, prefix: &str) -> Result<CorrelativeCode, RegistryError> {
        let mut tx = self.storage.begin_transaction().await?;
        match self.allocator.allocate(prefix, &mut *tx).await {
            Ok(code) => {
                tx.commit().await?;
                info!(code = code.as_str(), "code issued");
                Ok(code)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Patient, RegistryError> {
        self.storage
            .read_patient(id)
            .await?
            .ok_or(RegistryError::NotFound { id })
    }

    /// All patients ordered by id.
    pub async fn list(&self) -> Result<Vec<Patient>, RegistryError> {
        Ok(self.storage.list_patients().await?)
    }

    /// Applies `patch` to a patient under its row lock and commits.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: i64,
        patch: &PatientPatch,
        updated_by: &str,
    ) -> Result<Patient, RegistryError> {
        if updated_by.trim().is_empty() {
            return Err(RegistryError::InvalidPatient(
                "updatedBy must not be empty".into(),
            ));
        }

        if let Some(code) = &patch.clinical_record_code {
            self.check_clinical_record_code(code).await?;
        }

        let mut tx = self.storage.begin_transaction().await?;
        match update_in(&mut *tx, id, patch, updated_by).await {
            Ok(updated) => {
                tx.commit().await?;
                info!(id, "patient updated");
                Ok(updated)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// A replacement clinical-record code must be one the sequence has
    /// already issued. Committed counters only move forward, so a value at
    /// or below the committed one is never drawn again.
    async fn check_clinical_record_code(&self, code: &str) -> Result<(), RegistryError> {
        if code.trim().is_empty() {
            return Err(RegistryError::InvalidPatient(
                "clinicalRecordCode must not be empty".into(),
            ));
        }

        let prefix = &self.config.clinical_record_prefix;
        let parsed = CorrelativeCode::parse(code, prefix)
            .map_err(|e| RegistryError::InvalidPatient(e.to_string()))?;
        let issued = self.storage.peek_counter(prefix).await?;
        if parsed.value() > issued {
            return Err(RegistryError::InvalidPatient(format!(
                "clinicalRecordCode {code} has not been issued by sequence {prefix}"
            )));
        }
        Ok(())
    }
}

async fn update_in(
    tx: &mut dyn RegistryTransaction,
    id: i64,
    patch: &PatientPatch,
    updated_by: &str,
) -> Result<Patient, RegistryError> {
    let mut patient = tx
        .lock_patient(id)
        .await?
        .ok_or(RegistryError::NotFound { id })?;
    patch.apply(&mut patient, updated_by, now_utc());
    Ok(tx.update_patient(&patient).await?)
}

async fn rollback(tx: Box<dyn RegistryTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "rollback failed");
    }
}

/// A unique violation on `user_id` means another registration for the same
/// user won the race after our duplicate check.
fn conflict_error(err: StorageError, user_id: i64) -> RegistryError {
    match &err {
        StorageError::AlreadyExists { key, .. } if key.starts_with("user_id/") => {
            RegistryError::DuplicateUser { user_id }
        }
        _ => err.into(),
    }
}
