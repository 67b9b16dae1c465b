use thiserror::Error;

/// Core error types for registry operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid sequence prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Invalid correlative code '{code}': {reason}")]
    InvalidCode { code: String, reason: String },

    #[error("Invalid patient data: {message}")]
    InvalidPatient { message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidPrefix error
    pub fn invalid_prefix(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidCode error
    pub fn invalid_code(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCode {
            code: code.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidPatient error
    pub fn invalid_patient(message: impl Into<String>) -> Self {
        Self::InvalidPatient {
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error was caused by caller input rather than deployment setup
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrefix { .. } | Self::InvalidCode { .. } | Self::InvalidPatient { .. }
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
