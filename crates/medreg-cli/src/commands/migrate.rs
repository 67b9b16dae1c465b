use anyhow::{Context, Result, bail};
use medreg_db_postgres::{create_pool, migrations, test_connection};

use crate::config::{AppConfig, StorageBackend};
use crate::output::print_success;

pub async fn run(config: &AppConfig) -> Result<()> {
    if config.storage.backend != StorageBackend::Postgres {
        bail!("migrations only apply to the postgres backend");
    }

    let pool = create_pool(&config.storage.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    test_connection(&pool)
        .await
        .context("PostgreSQL is not answering queries")?;
    migrations::run(&pool).await.context("migration failed")?;

    print_success(&format!(
        "Applied {} embedded migration(s)",
        migrations::embedded_count()
    ));
    Ok(())
}
