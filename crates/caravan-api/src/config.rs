use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    /// Zero disables the periodic backup task.
    pub backup_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CARAVAN_BIND_ADDR", "127.0.0.1:8787");
        let db_path = value_or_default(&lookup, "CARAVAN_DB_PATH", "./data/caravan.db");
        let backup_dir = value_or_default(&lookup, "CARAVAN_BACKUP_DIR", "./data/backups");

        let backup_interval_secs =
            value_or_default(&lookup, "CARAVAN_BACKUP_INTERVAL_SECS", "86400")
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "CARAVAN_BACKUP_INTERVAL_SECS must be an integer in [0, 604800]"
                            .to_string(),
                    )
                })?;
        if backup_interval_secs > 604_800 {
            return Err(ConfigError::Invalid(
                "CARAVAN_BACKUP_INTERVAL_SECS must be in [0, 604800]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path: PathBuf::from(db_path),
            backup_dir: PathBuf::from(backup_dir),
            backup_interval: Duration::from_secs(backup_interval_secs),
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
