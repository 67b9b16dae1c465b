use medreg_correlative::AllocationError;
use medreg_storage::{ErrorCategory, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("User {user_id} is already registered as a patient")]
    DuplicateUser { user_id: i64 },

    #[error("Patient {id} not found")]
    NotFound { id: i64 },

    #[error("Invalid patient data: {0}")]
    InvalidPatient(String),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    /// Returns true when re-running the operation in a new transaction may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Allocation(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            Self::DuplicateUser { .. } | Self::NotFound { .. } | Self::InvalidPatient(_) => false,
        }
    }

    /// Category used when logging failures.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DuplicateUser { .. } => ErrorCategory::Conflict,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidPatient(_) => ErrorCategory::Validation,
            Self::Allocation(AllocationError::AllocationFailed { source, .. }) => source.category(),
            Self::Allocation(AllocationError::InvalidPrefix { .. }) => ErrorCategory::Validation,
            Self::Allocation(AllocationError::Exhausted { .. }) => ErrorCategory::Internal,
            Self::Storage(e) => e.category(),
        }
    }

    /// Returns true for errors caused by the request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateUser { .. }
                | Self::NotFound { .. }
                | Self::InvalidPatient(_)
                | Self::Allocation(AllocationError::InvalidPrefix { .. })
        )
    }
}
