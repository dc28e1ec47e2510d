//! CLI subcommands

pub mod config;
pub mod plan;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use vaultsync_cache::{DatabasePool, SqliteStateStore};
use vaultsync_core::config::Config;

use crate::output::GlobalOptions;

/// Configuration file in effect: `--config` or the platform default
pub fn config_path(options: &GlobalOptions) -> PathBuf {
    options
        .config_path
        .clone()
        .unwrap_or_else(Config::default_path)
}

/// Load the configuration file, falling back to defaults when it does
/// not exist. A file that exists but fails to parse is an error.
pub fn load_config(options: &GlobalOptions) -> Result<(PathBuf, Config)> {
    let path = config_path(options);
    if !path.exists() {
        debug!(config_path = %path.display(), "No configuration file, using defaults");
        return Ok((path, Config::default()));
    }
    let config = Config::load(&path)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    debug!(config_path = %path.display(), "Loaded configuration");
    Ok((path, config))
}

/// Open the state database named in the configuration
pub async fn open_store(config: &Config) -> Result<(DatabasePool, SqliteStateStore)> {
    let pool = DatabasePool::new(&config.state.db_path)
        .await
        .with_context(|| {
            format!(
                "Failed to open state database {}",
                config.state.db_path.display()
            )
        })?;
    let store = SqliteStateStore::new(pool.pool().clone());
    Ok((pool, store))
}
