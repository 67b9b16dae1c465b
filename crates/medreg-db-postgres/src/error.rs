//! Error types for the PostgreSQL storage backend.

use medreg_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// `lock_not_available`: raised when `lock_timeout` expires.
pub const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

/// `deadlock_detected`.
pub const PG_DEADLOCK_DETECTED: &str = "40P01";

/// `serialization_failure`.
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

/// `unique_violation`.
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Returns the name of the violated constraint for a unique violation.
pub fn violated_constraint(err: &SqlxError) -> Option<&str> {
    match err {
        SqlxError::Database(db_err) if has_pg_error_code(err, PG_UNIQUE_VIOLATION) => {
            db_err.constraint()
        }
        _ => None,
    }
}

/// Maps a sqlx error raised while working on `key` to a storage error.
///
/// Contention codes map to the retryable variants so callers can tell a
/// busy row from a broken database.
pub fn map_sqlx_error(err: SqlxError, key: &str) -> StorageError {
    match &err {
        SqlxError::Database(db_err) => match db_err.code().as_deref() {
            Some(PG_LOCK_NOT_AVAILABLE) => StorageError::lock_timeout(key),
            Some(PG_DEADLOCK_DETECTED) => StorageError::deadlock(db_err.message()),
            Some(PG_SERIALIZATION_FAILURE) => StorageError::serialization_failure(db_err.message()),
            Some(PG_UNIQUE_VIOLATION) => StorageError::already_exists(
                db_err.table().unwrap_or("row"),
                db_err.constraint().unwrap_or(key),
            ),
            _ => StorageError::internal(format!("{key}: {err}")),
        },
        SqlxError::Io(_) | SqlxError::PoolTimedOut | SqlxError::PoolClosed => {
            StorageError::connection_error(err.to_string())
        }
        _ => StorageError::internal(format!("{key}: {err}")),
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection_error(e.to_string()),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let storage_err: StorageError = PostgresError::config("test error").into();
        assert!(matches!(storage_err, StorageError::Internal { .. }));
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = map_sqlx_error(SqlxError::PoolTimedOut, "counter/CP");
        assert!(matches!(err, StorageError::ConnectionError { .. }));
        assert!(err.is_retryable());

        let err = map_sqlx_error(SqlxError::RowNotFound, "counter/CP");
        assert!(matches!(err, StorageError::Internal { .. }));
        assert!(!err.is_retryable());
    }
}
