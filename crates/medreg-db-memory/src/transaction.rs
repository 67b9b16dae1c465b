use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use medreg_core::{NewPatient, Patient, PatientCodes, Prefix, now_utc};
use medreg_storage::{CounterStore, RegistryTransaction, StorageError, counter_key};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::storage::{Inner, patient_key, unique_keys};

/// Point-in-time copy of the in-memory backend's transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub started: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub lock_timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LiveStats {
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    lock_timeouts: AtomicU64,
}

impl LiveStats {
    pub(crate) fn snapshot(&self) -> TransactionStats {
        TransactionStats {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_committed(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rolled_back(&self) {
        self.rolled_back.fetch_add(1, Ordering::Relaxed);
    }
}

/// An open in-memory transaction.
///
/// Holds the row locks it acquired and the writes it staged. Commit applies
/// the staged writes to the committed maps before the locks are released, so
/// the next holder of a row always reads the value this transaction wrote.
pub struct InMemoryTransaction {
    storage: Arc<Inner>,
    id: u64,
    held: HashMap<String, OwnedMutexGuard<()>>,
    counter_writes: HashMap<String, i64>,
    inserted: BTreeMap<i64, Patient>,
    updated: BTreeMap<i64, Patient>,
    finished: bool,
}

impl InMemoryTransaction {
    pub(crate) fn begin(storage: Arc<Inner>) -> Self {
        let id = storage.next_transaction_id();
        storage.stats.record_started();
        debug!(tx = id, "in-memory transaction started");
        Self {
            storage,
            id,
            held: HashMap::new(),
            counter_writes: HashMap::new(),
            inserted: BTreeMap::new(),
            updated: BTreeMap::new(),
            finished: false,
        }
    }

    async fn lock_row(&mut self, key: String) -> Result<(), StorageError> {
        if !self.held.contains_key(&key) {
            let guard = self.storage.acquire_row(&key, self.id).await?;
            self.held.insert(key, guard);
        }
        Ok(())
    }

    /// The patient as this transaction sees it.
    fn visible_patient(&self, id: i64) -> Option<Patient> {
        self.updated
            .get(&id)
            .or_else(|| self.inserted.get(&id))
            .cloned()
            .or_else(|| self.storage.committed_patient(id))
    }

    /// Returns the id of the patient that owns `key`, ignoring `exclude`,
    /// across committed state and this transaction's staged rows.
    fn unique_conflict(&self, key: &str, exclude: i64) -> Option<i64> {
        let staged = self
            .inserted
            .values()
            .chain(self.updated.values())
            .filter(|p| p.id != exclude)
            .find(|p| unique_keys(p).iter().any(|k| k == key))
            .map(|p| p.id);
        if staged.is_some() {
            return staged;
        }
        // A committed owner that this transaction rewrote no longer holds the key.
        self.storage
            .unique_owner(key)
            .filter(|owner| *owner != exclude)
            .filter(|owner| match self.updated.get(owner) {
                Some(p) => unique_keys(p).iter().any(|k| k == key),
                None => true,
            })
    }

    fn check_unique(&self, patient: &Patient) -> Result<(), StorageError> {
        for key in unique_keys(patient) {
            if self.unique_conflict(&key, patient.id).is_some() {
                return Err(StorageError::already_exists("patient", key));
            }
        }
        Ok(())
    }

    /// Applies staged writes. Caller holds the storage commit lock.
    fn apply(&self) -> Result<(), StorageError> {
        for patient in self.inserted.values().chain(self.updated.values()) {
            for key in unique_keys(patient) {
                if let Some(owner) = self.storage.unique_owner(&key)
                    && owner != patient.id
                    && !self.updated.contains_key(&owner)
                {
                    return Err(StorageError::already_exists("patient", key));
                }
            }
        }

        let counters = self.storage.counters.pin();
        for (prefix, value) in &self.counter_writes {
            let committed = counters.get(prefix).copied().unwrap_or(0);
            if *value <= committed {
                return Err(StorageError::counter_regression(prefix, *value, committed));
            }
        }
        for (prefix, value) in &self.counter_writes {
            counters.insert(prefix.clone(), *value);
        }

        let patients = self.storage.patients.pin();
        let unique = self.storage.unique.pin();
        for patient in self.updated.values() {
            if let Some(previous) = patients.get(&patient.id) {
                for key in unique_keys(previous) {
                    unique.remove(&key);
                }
            }
        }
        for patient in self.inserted.values().chain(self.updated.values()) {
            for key in unique_keys(patient) {
                unique.insert(key, patient.id);
            }
            patients.insert(patient.id, patient.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for InMemoryTransaction {
    async fn lock_and_read(&mut self, prefix: &Prefix) -> Result<i64, StorageError> {
        self.lock_row(counter_key(prefix)).await?;
        let value = match self.counter_writes.get(prefix.as_str()) {
            Some(staged) => *staged,
            None => self.storage.committed_counter(prefix.as_str()),
        };
        debug!(tx = self.id, %prefix, value, "counter row locked");
        Ok(value)
    }

    async fn write(&mut self, prefix: &Prefix, value: i64) -> Result<(), StorageError> {
        let key = counter_key(prefix);
        if !self.held.contains_key(&key) {
            return Err(StorageError::transaction_error(format!(
                "{key} must be locked before it is written"
            )));
        }
        let current = match self.counter_writes.get(prefix.as_str()) {
            Some(staged) => *staged,
            None => self.storage.committed_counter(prefix.as_str()),
        };
        if value <= current {
            return Err(StorageError::counter_regression(prefix.as_str(), value, current));
        }
        self.counter_writes.insert(prefix.as_str().to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl RegistryTransaction for InMemoryTransaction {
    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        {
            let _commit = self
                .storage
                .commit_lock
                .lock()
                .map_err(|_| StorageError::internal("commit lock poisoned"))?;
            self.apply()?;
        }
        self.finished = true;
        self.storage.stats.record_committed();
        debug!(
            tx = self.id,
            counters = self.counter_writes.len(),
            inserted = self.inserted.len(),
            updated = self.updated.len(),
            "in-memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), StorageError> {
        self.finished = true;
        self.storage.stats.record_rolled_back();
        debug!(tx = self.id, "in-memory transaction rolled back");
        Ok(())
    }

    async fn user_exists(&mut self, user_id: i64) -> Result<bool, StorageError> {
        let key = format!("user_id/{user_id}");
        Ok(self.unique_conflict(&key, 0).is_some())
    }

    async fn insert_patient(
        &mut self,
        patient: &NewPatient,
        codes: &PatientCodes,
    ) -> Result<Patient, StorageError> {
        patient
            .check_required()
            .map_err(|e| StorageError::invalid_record(e.to_string()))?;

        let id = self.storage.next_patient_id();
        let stored = patient.clone().into_patient(id, codes.clone(), now_utc());
        self.check_unique(&stored)?;

        // The new row is invisible to others until commit; lock it anyway so
        // a later `update_patient` in this transaction finds it held.
        self.lock_row(patient_key(id)).await?;
        self.inserted.insert(id, stored.clone());
        Ok(stored)
    }

    async fn lock_patient(&mut self, id: i64) -> Result<Option<Patient>, StorageError> {
        self.lock_row(patient_key(id)).await?;
        Ok(self.visible_patient(id))
    }

    async fn update_patient(&mut self, patient: &Patient) -> Result<Patient, StorageError> {
        if !self.held.contains_key(&patient_key(patient.id)) {
            return Err(StorageError::transaction_error(format!(
                "patient/{} must be locked before it is updated",
                patient.id
            )));
        }
        if self.visible_patient(patient.id).is_none() {
            return Err(StorageError::not_found("patient", patient.id));
        }
        self.check_unique(patient)?;

        if self.inserted.contains_key(&patient.id) {
            self.inserted.insert(patient.id, patient.clone());
        } else {
            self.updated.insert(patient.id, patient.clone());
        }
        Ok(patient.clone())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.storage.stats.record_rolled_back();
            debug!(
                tx = self.id,
                "in-memory transaction dropped without commit - rolled back"
            );
        }
    }
}
