//! Storage error types for the registry storage abstraction layer.
//!
//! This module defines all error types that can occur during storage operations.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("Record not found: {entity}/{id}")]
    NotFound {
        /// The kind of record that was not found.
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Record already exists: {entity}/{key}")]
    AlreadyExists {
        /// The kind of record.
        entity: String,
        /// The conflicting key (or constraint name).
        key: String,
    },

    /// Waiting for a row lock exceeded the configured lock timeout.
    #[error("Lock wait timed out on {key}")]
    LockTimeout {
        /// The locked row key.
        key: String,
    },

    /// The backend detected a deadlock and aborted this transaction.
    #[error("Deadlock detected: {message}")]
    Deadlock {
        /// Backend-provided description.
        message: String,
    },

    /// The backend could not serialize this transaction against a concurrent one.
    #[error("Serialization failure: {message}")]
    SerializationFailure {
        /// Backend-provided description.
        message: String,
    },

    /// A counter write would not move the committed value forward.
    #[error("Counter regression on {prefix}: attempted {attempted}, committed {committed}")]
    CounterRegression {
        /// The counter prefix.
        prefix: String,
        /// The value the caller tried to write.
        attempted: i64,
        /// The value currently committed (when known).
        committed: i64,
    },

    /// The record data is invalid.
    #[error("Invalid record: {message}")]
    InvalidRecord {
        /// Description of why the record is invalid.
        message: String,
    },

    /// An error occurred during a transaction.
    #[error("Transaction error: {message}")]
    TransactionError {
        /// Description of the transaction error.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Creates a new `LockTimeout` error.
    #[must_use]
    pub fn lock_timeout(key: impl Into<String>) -> Self {
        Self::LockTimeout { key: key.into() }
    }

    /// Creates a new `Deadlock` error.
    #[must_use]
    pub fn deadlock(message: impl Into<String>) -> Self {
        Self::Deadlock {
            message: message.into(),
        }
    }

    /// Creates a new `SerializationFailure` error.
    #[must_use]
    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::SerializationFailure {
            message: message.into(),
        }
    }

    /// Creates a new `CounterRegression` error.
    #[must_use]
    pub fn counter_regression(prefix: impl Into<String>, attempted: i64, committed: i64) -> Self {
        Self::CounterRegression {
            prefix: prefix.into(),
            attempted,
            committed,
        }
    }

    /// Creates a new `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a new `TransactionError` error.
    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is a lock timeout.
    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Returns `true` when re-running the whole enclosing transaction from
    /// scratch may succeed.
    ///
    /// A failed transaction leaves no durable change behind, so these errors
    /// are safe to retry at the transaction level.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::Deadlock { .. }
                | Self::SerializationFailure { .. }
                | Self::ConnectionError { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::Conflict,
            Self::LockTimeout { .. } => ErrorCategory::Contention,
            Self::Deadlock { .. } => ErrorCategory::Contention,
            Self::SerializationFailure { .. } => ErrorCategory::Contention,
            Self::CounterRegression { .. } => ErrorCategory::Internal,
            Self::InvalidRecord { .. } => ErrorCategory::Validation,
            Self::TransactionError { .. } => ErrorCategory::Transaction,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Uniqueness conflict.
    Conflict,
    /// Lock timeout, deadlock or serialization failure.
    Contention,
    /// Validation error.
    Validation,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Contention => write!(f, "contention"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("patient", 123);
        assert_eq!(err.to_string(), "Record not found: patient/123");

        let err = StorageError::lock_timeout("counter/HC");
        assert_eq!(err.to_string(), "Lock wait timed out on counter/HC");

        let err = StorageError::counter_regression("CP", 3, 5);
        assert_eq!(
            err.to_string(),
            "Counter regression on CP: attempted 3, committed 5"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("patient", 1);
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert!(!err.is_retryable());

        assert!(StorageError::lock_timeout("counter/CP").is_retryable());
        assert!(StorageError::deadlock("40P01").is_retryable());
        assert!(StorageError::serialization_failure("40001").is_retryable());
        assert!(StorageError::connection_error("reset").is_retryable());
        assert!(!StorageError::counter_regression("CP", 1, 1).is_retryable());
        assert!(!StorageError::already_exists("patient", "user_id=1").is_retryable());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::lock_timeout("counter/CP").category(),
            ErrorCategory::Contention
        );
        assert_eq!(
            StorageError::already_exists("patient", "user_id=1").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::invalid_record("bad data").category(),
            ErrorCategory::Validation
        );
        assert_eq!(ErrorCategory::Contention.to_string(), "contention");
    }
}
