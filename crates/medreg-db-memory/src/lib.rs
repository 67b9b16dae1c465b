//! In-memory storage backend for the medreg patient registry.
//!
//! This crate provides an in-memory implementation of the `RegistryStorage`
//! trait from `medreg-storage`, using papaya lock-free maps for committed
//! state and per-row async mutexes for transaction locks.
//!
//! # Example
//!
//! ```ignore
//! use medreg_db_memory::InMemoryStorage;
//! use medreg_storage::{CounterStore, RegistryStorage};
//!
//! let storage = InMemoryStorage::new();
//! let mut tx = storage.begin_transaction().await?;
//! let last = tx.lock_and_read(&prefix).await?;
//! tx.write(&prefix, last + 1).await?;
//! tx.commit().await?;
//! ```

pub mod factory;
pub mod storage;
pub mod transaction;

pub use medreg_storage::{DynStorage, RegistryStorage, RegistryTransaction, StorageError};

pub use factory::{DEFAULT_LOCK_TIMEOUT, StorageOptions, create_storage};
pub use storage::InMemoryStorage;
pub use transaction::{InMemoryTransaction, TransactionStats};
