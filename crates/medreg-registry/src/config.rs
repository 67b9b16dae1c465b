use medreg_core::Prefix;
use serde::{Deserialize, Serialize};

/// Registration workflow settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Sequence for the patient code.
    pub patient_code_prefix: Prefix,
    /// Sequence for the clinical-record code.
    pub clinical_record_prefix: Prefix,
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            patient_code_prefix: Prefix::patient_code(),
            clinical_record_prefix: Prefix::clinical_record(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.patient_code_prefix == self.clinical_record_prefix {
            return Err(format!(
                "patient_code_prefix and clinical_record_prefix must differ (both {})",
                self.patient_code_prefix
            ));
        }
        self.retry.validate()
    }
}

/// How often a registration is re-run after a retryable failure.
///
/// Each retry starts a fresh transaction. The wait doubles after every
/// attempt, capped at `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. `1` disables retries.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".into());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }

    /// Backoff to wait after `attempt` (1-based) failed.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let shift = attempt.saturating_sub(1).min(32);
        self.initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms)
    }
}
