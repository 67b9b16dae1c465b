use std::fs;

use anyhow::{Context, Result};
use medreg_core::{NewPatient, PatientPatch};
use medreg_registry::PatientRegistry;
use serde_json::{Map, Value};

use crate::cli::{OutputFormat, RegisterArgs, UpdateArgs};
use crate::output::{print_patient, print_patients, print_success};

fn read_json(path: &str) -> Result<Value> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {path}"))
}

/// Builds the registration request; the flags win over the file.
pub fn new_patient(args: &RegisterArgs) -> Result<NewPatient> {
    let mut fields = match &args.file {
        Some(path) => match read_json(path)? {
            Value::Object(map) => map,
            _ => anyhow::bail!("{path} must contain a JSON object"),
        },
        None => Map::new(),
    };
    fields.insert("userId".into(), Value::from(args.user_id));
    fields.insert("createdBy".into(), Value::from(args.created_by.clone()));
    serde_json::from_value(Value::Object(fields)).context("Invalid patient fields")
}

pub async fn register(
    registry: &PatientRegistry,
    args: &RegisterArgs,
    format: OutputFormat,
) -> Result<()> {
    let patient = registry.register(new_patient(args)?).await?;
    if format == OutputFormat::Table {
        print_success(&format!(
            "Registered patient {} ({} / {})",
            patient.id, patient.patient_code, patient.clinical_record_code
        ));
    }
    print_patient(&patient, format)
}

pub async fn get(registry: &PatientRegistry, id: i64, format: OutputFormat) -> Result<()> {
    let patient = registry.get(id).await?;
    print_patient(&patient, format)
}

pub async fn list(registry: &PatientRegistry, format: OutputFormat) -> Result<()> {
    let patients = registry.list().await?;
    print_patients(&patients, format)
}

pub async fn update(
    registry: &PatientRegistry,
    args: &UpdateArgs,
    format: OutputFormat,
) -> Result<()> {
    let patch: PatientPatch =
        serde_json::from_value(read_json(&args.file)?).context("Invalid patch fields")?;
    let patient = registry.update(args.id, &patch, &args.updated_by).await?;
    if format == OutputFormat::Table {
        print_success(&format!("Updated patient {}", patient.id));
    }
    print_patient(&patient, format)
}
