use anyhow::Result;
use colored::Colorize;
use medreg_core::Patient;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_patient(patient: &Patient, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(patient),
        OutputFormat::Table => {
            let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
            let rows = [
                ("ID", patient.id.to_string()),
                ("User", patient.user_id.to_string()),
                ("Patient code", patient.patient_code.clone()),
                ("Clinical record", patient.clinical_record_code.clone()),
                ("Blood type", opt(&patient.blood_type_id.map(|b| b.to_string()))),
                ("Allergies", opt(&patient.allergies)),
                ("Pre-existing conditions", opt(&patient.preexisting_conditions)),
                ("Emergency contact", opt(&patient.emergency_contact)),
                ("Emergency phone", opt(&patient.emergency_contact_phone)),
                ("Notes", opt(&patient.notes)),
                ("Created by", patient.created_by.clone()),
                ("Created at", patient.created_at.to_string()),
                ("Updated by", opt(&patient.updated_by)),
                ("Updated at", opt(&patient.updated_at.map(|t| t.to_string()))),
            ];

            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (field, value) in rows {
                builder.push_record([field.to_string(), value]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            Ok(())
        }
    }
}

pub fn print_patients(patients: &[Patient], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(patients),
        OutputFormat::Table => {
            if patients.is_empty() {
                println!("No patients found.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["ID", "User", "Patient code", "Clinical record", "Created at"]);
            for p in patients {
                builder.push_record([
                    p.id.to_string(),
                    p.user_id.to_string(),
                    p.patient_code.clone(),
                    p.clinical_record_code.clone(),
                    p.created_at.to_string(),
                ]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!("Total: {}", patients.len());
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CounterRow {
    pub prefix: String,
    pub last_value: i64,
}

pub fn print_counters(rows: &[CounterRow], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(rows),
        OutputFormat::Table => {
            let mut builder = Builder::default();
            builder.push_record(["Prefix", "Last value"]);
            for row in rows {
                builder.push_record([row.prefix.clone(), row.last_value.to_string()]);
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            Ok(())
        }
    }
}
