//! Patient registry records.
//!
//! The registry only cares about the identity columns (`user_id` and the two
//! correlative codes); the clinical fields are carried through untouched.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};

/// A registered patient as persisted by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Storage-assigned identifier.
    pub id: i64,
    /// The user account this patient belongs to. Unique across patients.
    pub user_id: i64,
    /// Patient code drawn from the patient-code sequence (e.g. `CP000001`).
    pub patient_code: String,
    /// Clinical-record code drawn from its own sequence (e.g. `HC000001`).
    pub clinical_record_code: String,
    #[serde(default)]
    pub blood_type_id: Option<i32>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub preexisting_conditions: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub updated_by: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Caller-supplied fields for a new registration. Codes are assigned by the
/// registry, never by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub user_id: i64,
    #[serde(default)]
    pub blood_type_id: Option<i32>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub preexisting_conditions: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: String,
}

impl NewPatient {
    pub fn new(user_id: i64, created_by: impl Into<String>) -> Self {
        Self {
            user_id,
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    /// Checks the columns the store cannot accept empty.
    pub fn check_required(&self) -> Result<()> {
        if self.created_by.trim().is_empty() {
            return Err(CoreError::invalid_patient("createdBy must not be empty"));
        }
        Ok(())
    }

    /// Builds the stored record once an id and codes have been assigned.
    pub fn into_patient(
        self,
        id: i64,
        codes: PatientCodes,
        created_at: OffsetDateTime,
    ) -> Patient {
        Patient {
            id,
            user_id: self.user_id,
            patient_code: codes.patient_code,
            clinical_record_code: codes.clinical_record_code,
            blood_type_id: self.blood_type_id,
            allergies: self.allergies,
            preexisting_conditions: self.preexisting_conditions,
            emergency_contact: self.emergency_contact,
            emergency_contact_phone: self.emergency_contact_phone,
            notes: self.notes,
            created_by: self.created_by,
            created_at,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// The pair of correlative codes assigned to one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientCodes {
    pub patient_code: String,
    pub clinical_record_code: String,
}

/// Partial update. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    #[serde(default)]
    pub clinical_record_code: Option<String>,
    #[serde(default)]
    pub blood_type_id: Option<i32>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub preexisting_conditions: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PatientPatch {
    /// Applies the patch and stamps the audit columns.
    pub fn apply(&self, patient: &mut Patient, updated_by: &str, now: OffsetDateTime) {
        fn merge<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        fn merge_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *target = value.clone();
            }
        }

        merge(&mut patient.clinical_record_code, &self.clinical_record_code);
        merge_opt(&mut patient.blood_type_id, &self.blood_type_id);
        merge_opt(&mut patient.allergies, &self.allergies);
        merge_opt(&mut patient.preexisting_conditions, &self.preexisting_conditions);
        merge_opt(&mut patient.emergency_contact, &self.emergency_contact);
        merge_opt(&mut patient.emergency_contact_phone, &self.emergency_contact_phone);
        merge_opt(&mut patient.notes, &self.notes);
        patient.updated_by = Some(updated_by.to_string());
        patient.updated_at = Some(now);
    }
}
