use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use medreg_core::{Patient, Prefix};
use medreg_storage::{RegistryStorage, RegistryTransaction, StorageError};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::factory::StorageOptions;
use crate::transaction::{InMemoryTransaction, LiveStats, TransactionStats};

/// Key of a row in the unique index, e.g. `user_id/7` or `patient_code/CP000001`.
pub(crate) type UniqueKey = String;

pub(crate) fn patient_key(id: i64) -> String {
    format!("patient/{id}")
}

pub(crate) fn unique_keys(patient: &Patient) -> [UniqueKey; 3] {
    [
        format!("user_id/{}", patient.user_id),
        format!("patient_code/{}", patient.patient_code),
        format!("clinical_record_code/{}", patient.clinical_record_code),
    ]
}

/// In-memory registry storage backend.
///
/// Committed state lives in papaya lock-free maps. Transactions never touch
/// it directly: they take per-row async locks, stage their writes and apply
/// them in one step at commit while still holding those locks.
///
/// This storage implementation provides:
/// - Row-level exclusive locks with a configurable wait timeout
/// - Read-your-own-writes inside a transaction
/// - Rollback on explicit request or on drop
/// - Unique `user_id`, `patient_code` and `clinical_record_code`
#[derive(Clone)]
pub struct InMemoryStorage {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    /// Committed counter values, keyed by prefix
    pub(crate) counters: PapayaHashMap<String, i64>,
    /// Committed patients, keyed by id
    pub(crate) patients: PapayaHashMap<i64, Patient>,
    /// Unique index: key -> owning patient id
    pub(crate) unique: PapayaHashMap<UniqueKey, i64>,
    /// One async mutex per locked row (`counter/CP`, `patient/12`, ...)
    row_locks: PapayaHashMap<String, Arc<Mutex<()>>>,
    /// Serializes the apply phase of commits
    pub(crate) commit_lock: std::sync::Mutex<()>,
    patient_seq: AtomicI64,
    tx_seq: AtomicU64,
    pub(crate) stats: LiveStats,
    options: StorageOptions,
}

impl InMemoryStorage {
    /// Creates a new in-memory storage with default options.
    pub fn new() -> Self {
        Self::with_options(StorageOptions::default())
    }

    /// Creates a new in-memory storage with the given options.
    pub fn with_options(options: StorageOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                counters: PapayaHashMap::new(),
                patients: PapayaHashMap::new(),
                unique: PapayaHashMap::new(),
                row_locks: PapayaHashMap::new(),
                commit_lock: std::sync::Mutex::new(()),
                patient_seq: AtomicI64::new(1),
                tx_seq: AtomicU64::new(1),
                stats: LiveStats::default(),
                options,
            }),
        }
    }

    /// Returns a snapshot of transaction statistics.
    pub fn transaction_stats(&self) -> TransactionStats {
        self.inner.stats.snapshot()
    }

    pub fn options(&self) -> &StorageOptions {
        &self.inner.options
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("counters", &self.inner.counters.len())
            .field("patients", &self.inner.patients.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Inner {
    pub(crate) fn next_transaction_id(&self) -> u64 {
        self.tx_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_patient_id(&self) -> i64 {
        self.patient_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn committed_counter(&self, prefix: &str) -> i64 {
        self.counters.pin().get(prefix).copied().unwrap_or(0)
    }

    pub(crate) fn committed_patient(&self, id: i64) -> Option<Patient> {
        self.patients.pin().get(&id).cloned()
    }

    /// Returns the patient id owning `key` in committed state.
    pub(crate) fn unique_owner(&self, key: &str) -> Option<i64> {
        self.unique.pin().get(key).copied()
    }

    /// Acquires the exclusive lock for a row, waiting at most the configured
    /// lock timeout.
    pub(crate) async fn acquire_row(
        &self,
        key: &str,
        tx_id: u64,
    ) -> Result<OwnedMutexGuard<()>, StorageError> {
        // The pinned map guard must not live across the await below.
        let lock = {
            let locks = self.row_locks.pin();
            Arc::clone(locks.get_or_insert_with(key.to_string(), || Arc::new(Mutex::new(()))))
        };

        if let Ok(guard) = Arc::clone(&lock).try_lock_owned() {
            return Ok(guard);
        }

        debug!(tx = tx_id, row = key, "waiting for row lock");
        match tokio::time::timeout(self.options.lock_timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.stats.record_lock_timeout();
                warn!(
                    tx = tx_id,
                    row = key,
                    timeout_ms = self.options.lock_timeout.as_millis() as u64,
                    "row lock wait timed out"
                );
                Err(StorageError::lock_timeout(key))
            }
        }
    }
}

#[async_trait]
impl RegistryStorage for InMemoryStorage {
    async fn begin_transaction(&self) -> Result<Box<dyn RegistryTransaction>, StorageError> {
        Ok(Box::new(InMemoryTransaction::begin(Arc::clone(&self.inner))))
    }

    async fn read_patient(&self, id: i64) -> Result<Option<Patient>, StorageError> {
        Ok(self.inner.committed_patient(id))
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StorageError> {
        let mut patients: Vec<Patient> = self
            .inner
            .patients
            .pin()
            .iter()
            .map(|(_, p)| p.clone())
            .collect();
        patients.sort_by_key(|p| p.id);
        Ok(patients)
    }

    async fn peek_counter(&self, prefix: &Prefix) -> Result<i64, StorageError> {
        Ok(self.inner.committed_counter(prefix.as_str()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
