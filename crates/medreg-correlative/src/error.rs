use medreg_storage::StorageError;
use thiserror::Error;

/// Errors returned by [`crate::CorrelativeAllocator`].
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The counter store failed. Nothing was issued; the enclosing
    /// transaction must not commit.
    #[error("Allocation failed for prefix '{prefix}': {source}")]
    AllocationFailed {
        prefix: String,
        #[source]
        source: StorageError,
    },

    #[error("Invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Sequence '{prefix}' is exhausted")]
    Exhausted { prefix: String },
}

impl AllocationError {
    pub fn failed(prefix: impl Into<String>, source: StorageError) -> Self {
        Self::AllocationFailed {
            prefix: prefix.into(),
            source,
        }
    }

    pub fn invalid_prefix(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// The prefix the failed request was for.
    pub fn prefix(&self) -> &str {
        match self {
            Self::AllocationFailed { prefix, .. }
            | Self::InvalidPrefix { prefix, .. }
            | Self::Exhausted { prefix } => prefix,
        }
    }

    /// Returns true when re-running the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AllocationFailed { source, .. } => source.is_retryable(),
            Self::InvalidPrefix { .. } | Self::Exhausted { .. } => false,
        }
    }
}
