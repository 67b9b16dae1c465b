//! # medreg-storage
//!
//! Storage abstraction layer for the medreg patient registry.
//!
//! This crate defines the traits and types that all storage backends must
//! implement. It does not contain any implementations; those live in
//! `medreg-db-memory` and `medreg-db-postgres`.
//!
//! ## Overview
//!
//! - [`CounterStore`]: lock-and-read / conditional write over the
//!   prefix-keyed counter rows, scoped to a transaction
//! - [`RegistryTransaction`]: the transaction handle (commit, rollback and
//!   the patient writes that share the counter transaction)
//! - [`RegistryStorage`]: the shared backend handle that begins transactions
//!   and serves committed reads

mod error;
mod traits;

// Re-export everything from submodules
pub use error::{ErrorCategory, StorageError};
pub use traits::{CounterStore, RegistryStorage, RegistryTransaction};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn RegistryStorage>;

/// Row key used for the counter row of `prefix` in lock bookkeeping and errors.
pub fn counter_key(prefix: &medreg_core::Prefix) -> String {
    format!("counter/{prefix}")
}

/// Prelude module for convenient imports.
///
/// ```ignore
/// use medreg_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ErrorCategory, StorageError};
    pub use crate::traits::{CounterStore, RegistryStorage, RegistryTransaction};
    pub use crate::{DynStorage, StorageResult, counter_key};
}
