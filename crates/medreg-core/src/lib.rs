//! Core types for the medreg patient registry.
//!
//! This crate holds the pure, I/O-free building blocks shared by the storage
//! backends, the correlative allocator and the registration workflow:
//!
//! - [`Prefix`]: a validated sequence key such as `CP` or `HC`
//! - [`CorrelativeCode`]: a prefix plus a zero-padded sequence value
//! - [`Patient`], [`NewPatient`], [`PatientPatch`]: the registry record
//! - [`CoreError`]: errors raised while building the above

pub mod code;
pub mod error;
pub mod patient;
pub mod prefix;
pub mod time;

pub use code::{CorrelativeCode, MAX_PADDING_WIDTH};
pub use error::{CoreError, Result};
pub use patient::{NewPatient, Patient, PatientCodes, PatientPatch};
pub use prefix::{MAX_PREFIX_LEN, Prefix};
pub use time::now_utc;
