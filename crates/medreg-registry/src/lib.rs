//! Patient registration workflow.
//!
//! [`PatientRegistry`] opens a transaction, rejects users that are already
//! registered, draws a patient code and a clinical-record code from their
//! sequences and inserts the patient, committing all of it or none of it.
//!
//! ```ignore
//! let registry = PatientRegistry::new(storage, allocator, RegistryConfig::default());
//! let patient = registry.register(NewPatient::new(42, "admin")).await?;
//! assert_eq!(patient.patient_code, "CP000001");
//! ```

mod config;
mod error;
mod registry;

pub use config::{RegistryConfig, RetryPolicy};
pub use error::RegistryError;
pub use registry::PatientRegistry;
