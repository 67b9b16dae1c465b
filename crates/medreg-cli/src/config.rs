use std::time::Duration;

use medreg_correlative::{AllocatorConfig, UnknownPrefixPolicy};
use medreg_db_memory::{DEFAULT_LOCK_TIMEOUT, StorageOptions};
use medreg_db_postgres::PostgresConfig;
use medreg_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Storage validations
        if self.storage.backend == StorageBackend::Postgres {
            let pg = &self.storage.postgres;
            if pg.url.trim().is_empty() {
                return Err("storage.postgres.url must not be empty".into());
            }
            if pg.pool_size == 0 {
                return Err("storage.postgres.pool_size must be > 0".into());
            }
            if pg.lock_timeout_ms == 0 {
                return Err("storage.postgres.lock_timeout_ms must be > 0".into());
            }
        }
        if self.storage.memory.lock_timeout_ms == 0 {
            return Err("storage.memory.lock_timeout_ms must be > 0".into());
        }

        // Allocator / registry validations
        self.allocator
            .validate()
            .map_err(|e| format!("allocator: {e}"))?;
        self.registry.validate().map_err(|e| format!("registry: {e}"))?;
        if self.allocator.unknown_prefix == UnknownPrefixPolicy::Reject {
            for prefix in [
                &self.registry.patient_code_prefix,
                &self.registry.clinical_record_prefix,
            ] {
                if !self.allocator.prefixes.iter().any(|p| &p.prefix == prefix) {
                    return Err(format!(
                        "registry prefix {prefix} is not listed in allocator.prefixes \
                         and allocator.unknown_prefix is reject"
                    ));
                }
            }
        }

        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local; state is lost when the command exits.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_memory_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_memory_lock_timeout_ms(),
        }
    }
}

impl MemoryConfig {
    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions::default().with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "medreg.toml";

    /// Loads the file at `path` (or `medreg.toml`) if it exists, applies
    /// `MEDREG__SECTION__KEY` environment overrides and validates the result.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if let Some(p) = path {
            return Err(format!("config file not found: {p}"));
        }
        // Environment variable overrides, e.g., MEDREG__STORAGE__POSTGRES__POOL_SIZE=20
        builder = builder.add_source(
            Environment::with_prefix("MEDREG")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
