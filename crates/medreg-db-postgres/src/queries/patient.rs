//! Patient table queries.

use chrono::{DateTime, Utc};
use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::row::Row;
use sqlx_postgres::{PgConnection, PgRow, Postgres};

use medreg_core::{NewPatient, Patient, PatientCodes, now_utc};
use medreg_storage::StorageError;

use super::{chrono_to_time, time_to_chrono};
use crate::error::{map_sqlx_error, violated_constraint};

const PATIENT_COLUMNS: &str = "id, user_id, patient_code, clinical_record_code, blood_type_id, \
     allergies, preexisting_conditions, emergency_contact, emergency_contact_phone, notes, \
     created_by, created_at, updated_by, updated_at";

fn patient_from_row(row: &PgRow) -> Result<Patient, sqlx_core::error::Error> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at")?;

    Ok(Patient {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        patient_code: row.try_get("patient_code")?,
        clinical_record_code: row.try_get("clinical_record_code")?,
        blood_type_id: row.try_get("blood_type_id")?,
        allergies: row.try_get("allergies")?,
        preexisting_conditions: row.try_get("preexisting_conditions")?,
        emergency_contact: row.try_get("emergency_contact")?,
        emergency_contact_phone: row.try_get("emergency_contact_phone")?,
        notes: row.try_get("notes")?,
        created_by: row.try_get("created_by")?,
        created_at: chrono_to_time(created_at),
        updated_by: row.try_get("updated_by")?,
        updated_at: updated_at.map(chrono_to_time),
    })
}

/// Maps a unique violation on the patient table to the index key it hit,
/// using the same `column/value` shape the in-memory backend reports.
fn unique_key(err: &sqlx_core::error::Error, patient: &Patient) -> Option<String> {
    match violated_constraint(err)? {
        "patient_user_id_key" => Some(format!("user_id/{}", patient.user_id)),
        "patient_patient_code_key" => Some(format!("patient_code/{}", patient.patient_code)),
        "patient_clinical_record_code_key" => Some(format!(
            "clinical_record_code/{}",
            patient.clinical_record_code
        )),
        _ => None,
    }
}

fn map_write_error(err: sqlx_core::error::Error, patient: &Patient) -> StorageError {
    match unique_key(&err, patient) {
        Some(key) => StorageError::already_exists("patient", key),
        None => map_sqlx_error(err, &format!("patient/{}", patient.id)),
    }
}

pub async fn user_exists(conn: &mut PgConnection, user_id: i64) -> Result<bool, StorageError> {
    query_scalar("SELECT EXISTS (SELECT 1 FROM patient WHERE user_id = $1)")
        .bind(user_id)
        .fetch_one(conn)
        .await
        .map_err(|e| map_sqlx_error(e, &format!("user_id/{user_id}")))
}

pub async fn insert(
    conn: &mut PgConnection,
    patient: &NewPatient,
    codes: &PatientCodes,
) -> Result<Patient, StorageError> {
    let created_at = now_utc();
    let sql = format!(
        "INSERT INTO patient (user_id, patient_code, clinical_record_code, blood_type_id, \
         allergies, preexisting_conditions, emergency_contact, emergency_contact_phone, notes, \
         created_by, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING {PATIENT_COLUMNS}"
    );

    let row = query(&sql)
        .bind(patient.user_id)
        .bind(&codes.patient_code)
        .bind(&codes.clinical_record_code)
        .bind(patient.blood_type_id)
        .bind(&patient.allergies)
        .bind(&patient.preexisting_conditions)
        .bind(&patient.emergency_contact)
        .bind(&patient.emergency_contact_phone)
        .bind(&patient.notes)
        .bind(&patient.created_by)
        .bind(time_to_chrono(created_at))
        .fetch_one(conn)
        .await
        .map_err(|e| {
            let attempted = patient.clone().into_patient(0, codes.clone(), created_at);
            map_write_error(e, &attempted)
        })?;

    patient_from_row(&row).map_err(|e| StorageError::internal(format!("patient row: {e}")))
}

/// Reads a patient and takes its row lock.
pub async fn lock(conn: &mut PgConnection, id: i64) -> Result<Option<Patient>, StorageError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patient WHERE id = $1 FOR UPDATE");
    let row = query(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error(e, &format!("patient/{id}")))?;

    row.as_ref()
        .map(patient_from_row)
        .transpose()
        .map_err(|e| StorageError::internal(format!("patient row: {e}")))
}

pub async fn update(conn: &mut PgConnection, patient: &Patient) -> Result<Patient, StorageError> {
    let sql = format!(
        "UPDATE patient SET clinical_record_code = $2, blood_type_id = $3, allergies = $4, \
         preexisting_conditions = $5, emergency_contact = $6, emergency_contact_phone = $7, \
         notes = $8, updated_by = $9, updated_at = $10 \
         WHERE id = $1 \
         RETURNING {PATIENT_COLUMNS}"
    );

    let row = query(&sql)
        .bind(patient.id)
        .bind(&patient.clinical_record_code)
        .bind(patient.blood_type_id)
        .bind(&patient.allergies)
        .bind(&patient.preexisting_conditions)
        .bind(&patient.emergency_contact)
        .bind(&patient.emergency_contact_phone)
        .bind(&patient.notes)
        .bind(&patient.updated_by)
        .bind(patient.updated_at.map(time_to_chrono))
        .fetch_optional(conn)
        .await
        .map_err(|e| map_write_error(e, patient))?
        .ok_or_else(|| StorageError::not_found("patient", patient.id))?;

    patient_from_row(&row).map_err(|e| StorageError::internal(format!("patient row: {e}")))
}

pub async fn read<'e, E>(executor: E, id: i64) -> Result<Option<Patient>, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patient WHERE id = $1");
    let row = query(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx_error(e, &format!("patient/{id}")))?;

    row.as_ref()
        .map(patient_from_row)
        .transpose()
        .map_err(|e| StorageError::internal(format!("patient row: {e}")))
}

pub async fn list<'e, E>(executor: E) -> Result<Vec<Patient>, StorageError>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patient ORDER BY id");
    let rows = query(&sql)
        .fetch_all(executor)
        .await
        .map_err(|e| map_sqlx_error(e, "patient"))?;

    rows.iter()
        .map(patient_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::internal(format!("patient row: {e}")))
}
