use anyhow::Result;
use medreg_core::Prefix;
use medreg_registry::PatientRegistry;

use crate::cli::OutputFormat;
use crate::output::{CounterRow, print_counters, print_json, print_success};

pub async fn allocate(registry: &PatientRegistry, prefix: &str, format: OutputFormat) -> Result<()> {
    let code = registry.issue_code(prefix).await?;
    match format {
        OutputFormat::Json => print_json(&code),
        OutputFormat::Table => {
            print_success(&format!("Allocated {code}"));
            Ok(())
        }
    }
}

/// Committed values for every configured prefix plus the registry's own.
pub async fn counters(registry: &PatientRegistry, format: OutputFormat) -> Result<()> {
    let mut prefixes: Vec<Prefix> = registry
        .allocator()
        .config()
        .prefixes
        .iter()
        .map(|p| p.prefix.clone())
        .collect();
    for prefix in [
        &registry.config().patient_code_prefix,
        &registry.config().clinical_record_prefix,
    ] {
        if !prefixes.contains(prefix) {
            prefixes.push(prefix.clone());
        }
    }

    let mut rows = Vec::with_capacity(prefixes.len());
    for prefix in prefixes {
        let last_value = registry.storage().peek_counter(&prefix).await?;
        rows.push(CounterRow {
            prefix: prefix.into_inner(),
            last_value,
        });
    }
    print_counters(&rows, format)
}
