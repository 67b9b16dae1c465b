use std::sync::Arc;
use std::time::Duration;

use medreg_storage::DynStorage;

use crate::InMemoryStorage;

/// Default time a transaction waits for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage-specific configuration options.
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// How long `lock_and_read` (and patient row locks) may wait before
    /// failing with `StorageError::LockTimeout`.
    pub lock_timeout: Duration,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StorageOptions {
    /// Sets the row lock timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Create a shared in-memory storage instance.
pub fn create_storage(options: StorageOptions) -> DynStorage {
    Arc::new(InMemoryStorage::with_options(options))
}
