//! Database migration management for the PostgreSQL storage backend.
//!
//! Migrations are embedded in the binary and tracked in `_sqlx_migrations`.
//! To add one, drop the SQL file in `migrations/` and list it below.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use sqlx_postgres::PgPool;
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};

macro_rules! embedded_migrations {
    () => {
        &[
            (
                20260301000001i64,
                "correlative_counter",
                include_str!("../../migrations/20260301000001_correlative_counter.sql"),
            ),
            (
                20260301000002i64,
                "patient",
                include_str!("../../migrations/20260301000002_patient.sql"),
            ),
        ]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Number of migrations embedded in this build.
pub fn embedded_count() -> usize {
    embedded_migrations!().len()
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns an error if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running database migrations (embedded)");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };

    migrator
        .run(pool)
        .await
        .map_err(|e| PostgresError::Migration(format!("Migration failed: {e}")))?;

    info!("Database migrations completed successfully");

    Ok(())
}
