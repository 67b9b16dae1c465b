//! Storage traits for the registry storage abstraction layer.
//!
//! Two contracts live here:
//!
//! - [`CounterStore`]: the lock-then-write protocol over prefix-keyed counter
//!   rows. It is only reachable through an open transaction.
//! - [`RegistryStorage`] / [`RegistryTransaction`]: the record store the
//!   registration workflow drives, plus the transaction boundary it owns.

use async_trait::async_trait;
use medreg_core::{NewPatient, Patient, PatientCodes, Prefix};

use crate::error::StorageError;

/// Transaction-scoped access to the sequence counter rows.
///
/// Every method runs inside the transaction that implements this trait.
/// Counter mutations become visible to other transactions only after that
/// transaction commits, and vanish if it rolls back.
#[async_trait]
pub trait CounterStore: Send {
    /// Locks the counter row for `prefix` and returns its current value.
    ///
    /// Blocks while another transaction holds the same row; rows for other
    /// prefixes are never affected. Returns `0` when the prefix has never
    /// been used (the row is created lazily). Locking a row this transaction
    /// already holds returns immediately with the value this transaction
    /// sees, including its own uncommitted write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LockTimeout` when the wait exceeds the
    /// backend's lock timeout, `StorageError::Deadlock` when the backend
    /// aborts the transaction to break a cycle, and infrastructure errors
    /// otherwise. An error never means "no value issued yet".
    async fn lock_and_read(&mut self, prefix: &Prefix) -> Result<i64, StorageError>;

    /// Stores `value` as the last issued value for `prefix`.
    ///
    /// The write is conditional: it only succeeds when `value` is strictly
    /// greater than the committed value, and the row must have been locked
    /// by [`CounterStore::lock_and_read`] in this transaction first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::CounterRegression` if the write would not move
    /// the counter forward.
    async fn write(&mut self, prefix: &Prefix, value: i64) -> Result<(), StorageError>;
}

/// The main storage trait that all registry storage backends must implement.
///
/// Implementations must be thread-safe (`Send + Sync`); one instance is
/// shared by every request-handling task.
#[async_trait]
pub trait RegistryStorage: Send + Sync {
    /// Begins a new transaction.
    ///
    /// The transaction must be either committed or rolled back; dropping it
    /// without doing either rolls it back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionError` or
    /// `StorageError::TransactionError` if a transaction cannot be started.
    async fn begin_transaction(&self) -> Result<Box<dyn RegistryTransaction>, StorageError>;

    /// Reads a committed patient by id. Returns `None` if it does not exist.
    async fn read_patient(&self, id: i64) -> Result<Option<Patient>, StorageError>;

    /// Lists all committed patients ordered by id.
    async fn list_patients(&self) -> Result<Vec<Patient>, StorageError>;

    /// Returns the committed value of a counter without locking it.
    ///
    /// Intended for inspection. Allocation must go through
    /// [`CounterStore::lock_and_read`].
    async fn peek_counter(&self, prefix: &Prefix) -> Result<i64, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A transaction for performing atomic registry operations.
///
/// Operations within a transaction are isolated from other operations until
/// the transaction is committed. If an error occurs or `rollback` is called,
/// all operations (counter writes included) are undone.
///
/// # Example
///
/// ```ignore
/// use medreg_storage::{CounterStore, RegistryStorage};
///
/// async fn bump(storage: &dyn RegistryStorage, prefix: &Prefix) -> Result<i64, StorageError> {
///     let mut tx = storage.begin_transaction().await?;
///     let next = tx.lock_and_read(prefix).await? + 1;
///     tx.write(prefix, next).await?;
///     tx.commit().await?;
///     Ok(next)
/// }
/// ```
#[async_trait]
pub trait RegistryTransaction: CounterStore + Send + Sync {
    /// Commits all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::TransactionError` if the commit fails, or
    /// `StorageError::AlreadyExists` if a deferred uniqueness check fails.
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    /// Rolls back all operations in this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;

    /// Returns whether a patient is registered for `user_id`, as seen by
    /// this transaction.
    async fn user_exists(&mut self, user_id: i64) -> Result<bool, StorageError>;

    /// Inserts a new patient with the given codes and returns the stored
    /// record with its assigned id and creation timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the user id or either code
    /// is already taken.
    async fn insert_patient(
        &mut self,
        patient: &NewPatient,
        codes: &PatientCodes,
    ) -> Result<Patient, StorageError>;

    /// Reads a patient and locks its row for the rest of the transaction.
    async fn lock_patient(&mut self, id: i64) -> Result<Option<Patient>, StorageError>;

    /// Replaces a patient previously locked with [`RegistryTransaction::lock_patient`].
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the patient does not exist.
    async fn update_patient(&mut self, patient: &Patient) -> Result<Patient, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that RegistryStorage is object-safe
    fn _assert_storage_object_safe(_: &dyn RegistryStorage) {}

    // Compile-time test that RegistryTransaction is object-safe
    fn _assert_transaction_object_safe(_: &dyn RegistryTransaction) {}

    // Compile-time test that CounterStore is object-safe
    fn _assert_counter_store_object_safe(_: &dyn CounterStore) {}
}
