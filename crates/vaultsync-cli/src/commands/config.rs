//! Config command - View and manage vaultsync configuration
//!
//! Provides the `vaultsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON), password masked
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Writes a default configuration file

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use vaultsync_core::config::Config;
use vaultsync_core::domain::{ConflictAction, MtimeResolution, SyncDirection};

use super::{config_path, load_config};
use crate::output::{plural, GlobalOptions};

/// Shown instead of a configured password
const MASK: &str = "********";

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.vault_id", "Vault identifier"),
    ("sync.profile_id", "Profile identifier"),
    ("sync.direction", "bidirectional|incremental_pull_only|incremental_push_only|incremental_pull_and_delete_only|incremental_push_and_delete_only"),
    ("sync.conflict_action", "keep_newer|keep_larger|smart_conflict"),
    ("sync.concurrency", "Parallel tasks per phase (1-32)"),
    ("sync.skip_size_larger_than", "Size ceiling in bytes, 0 or negative for none"),
    ("sync.protect_modify_percentage", "Abort threshold (0-100)"),
    ("sync.ignore_paths", "Comma-separated glob patterns"),
    ("sync.allow_dot_paths", "true|false"),
    ("local.root", "Local replica directory"),
    ("remote.root", "Remote replica directory"),
    ("remote.mtime_resolution", "millis|seconds"),
    ("encryption.password", "Remote encryption password, empty to disable"),
    ("state.db_path", "State database file"),
    ("logging.level", "trace|debug|info|warn|error"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.direction")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(options),
            ConfigCommand::Set { key, value } => execute_set(options, key, value),
            ConfigCommand::Validate => execute_validate(options),
            ConfigCommand::Path => execute_path(options),
            ConfigCommand::Init { force } => execute_init(options, *force),
        }
    }
}

fn execute_show(options: &GlobalOptions) -> Result<()> {
    let formatter = options.formatter();
    let (path, config) = load_config(options)?;
    let config = masked(config);

    info!(config_path = %path.display(), "Showing configuration");

    if options.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_set(options: &GlobalOptions, key: &str, value: &str) -> Result<()> {
    let formatter = options.formatter();
    let (path, mut config) = load_config(options)?;

    info!(key, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if options.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, description) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<34} - {description}"));
            }
        }
        anyhow::bail!("Configuration not changed");
    }

    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        if options.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": messages,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", messages.join("; ")));
        }
        anyhow::bail!("Configuration not changed");
    }

    save(&path, &config)?;

    // The password itself is never echoed back
    let shown = if key == "encryption.password" { MASK } else { value };
    if options.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": shown,
            "config_path": path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key} = {shown}"));
        formatter.info(&format!("Saved to {}", path.display()));
    }
    Ok(())
}

fn execute_validate(options: &GlobalOptions) -> Result<()> {
    let formatter = options.formatter();
    let path = config_path(options);

    if !path.exists() {
        if options.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": false,
                "config_path": path.display().to_string(),
                "errors": ["Configuration file not found. Using defaults."],
            }));
        } else {
            formatter.info(&format!("Configuration file not found at {}", path.display()));
            formatter.info("Run 'vaultsync config init' to create one.");
        }
        return Ok(());
    }

    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            if options.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {e}")],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {e}"));
                formatter.info(&format!("File: {}", path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %path.display(), "Validating configuration");
    let errors = config.validate();

    if options.is_json() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", path.display()));
    } else {
        formatter.error(&format!("Configuration has {}:", plural(errors.len(), "error")));
        formatter.info(&format!("File: {}", path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

fn execute_path(options: &GlobalOptions) -> Result<()> {
    let path = config_path(options);
    if options.is_json() {
        options.formatter().print_json(&serde_json::json!({
            "config_path": path.display().to_string(),
            "exists": path.exists(),
        }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

fn execute_init(options: &GlobalOptions, force: bool) -> Result<()> {
    let formatter = options.formatter();
    let path = config_path(options);

    if path.exists() && !force {
        formatter.error(&format!(
            "{} already exists; use --force to overwrite",
            path.display()
        ));
        anyhow::bail!("Configuration file already exists");
    }

    save(&path, &Config::default())?;
    if options.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "config_path": path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Wrote default configuration to {}", path.display()));
    }
    Ok(())
}

fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    std::fs::write(path, yaml).context("Failed to write configuration file")?;
    Ok(())
}

fn masked(mut config: Config) -> Config {
    if !config.encryption.password.is_empty() {
        config.encryption.password = MASK.to_string();
    }
    config
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.vault_id" => config.sync.vault_id = value.to_string(),
        "sync.profile_id" => config.sync.profile_id = value.to_string(),
        "sync.direction" => {
            config.sync.direction = value.parse::<SyncDirection>()?;
        }
        "sync.conflict_action" => {
            config.sync.conflict_action = value.parse::<ConflictAction>()?;
        }
        "sync.concurrency" => {
            config.sync.concurrency = value
                .parse::<usize>()
                .context("Expected a positive integer for sync.concurrency")?;
        }
        "sync.skip_size_larger_than" => {
            config.sync.skip_size_larger_than = value
                .parse::<i64>()
                .context("Expected an integer number of bytes")?;
        }
        "sync.protect_modify_percentage" => {
            config.sync.protect_modify_percentage = value
                .parse::<u8>()
                .context("Expected a percentage between 0 and 100")?;
        }
        "sync.ignore_paths" => {
            config.sync.ignore_paths = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        "sync.allow_dot_paths" => {
            config.sync.allow_dot_paths = value
                .parse::<bool>()
                .context("Expected true or false")?;
        }

        // --- replicas ---
        "local.root" => config.local.root = PathBuf::from(value),
        "remote.root" => config.remote.root = PathBuf::from(value),
        "remote.mtime_resolution" => {
            config.remote.mtime_resolution = serde_yaml::from_str::<MtimeResolution>(value)
                .context("Expected millis or seconds")?;
        }

        // --- encryption / state / logging ---
        "encryption.password" => config.encryption.password = value.to_string(),
        "state.db_path" => config.state.db_path = PathBuf::from(value),
        "logging.level" => config.logging.level = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_direction() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.direction", "incremental_pull_only").unwrap();
        assert_eq!(config.sync.direction, SyncDirection::IncrementalPullOnly);
    }

    #[test]
    fn test_apply_conflict_action() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.conflict_action", "smart_conflict").unwrap();
        assert_eq!(config.sync.conflict_action, ConflictAction::SmartConflict);
    }

    #[test]
    fn test_apply_unknown_direction_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.direction", "sideways").is_err());
    }

    #[test]
    fn test_apply_concurrency() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.concurrency", "8").unwrap();
        assert_eq!(config.sync.concurrency, 8);
        assert!(apply_config_value(&mut config, "sync.concurrency", "-1").is_err());
    }

    #[test]
    fn test_apply_size_ceiling_accepts_negative() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.skip_size_larger_than", "-1").unwrap();
        assert_eq!(config.size_ceiling(), None);
        apply_config_value(&mut config, "sync.skip_size_larger_than", "1024").unwrap();
        assert_eq!(config.size_ceiling(), Some(1024));
    }

    #[test]
    fn test_apply_ignore_paths_list() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.ignore_paths", "*.tmp, cache/**,,").unwrap();
        assert_eq!(config.sync.ignore_paths, vec!["*.tmp", "cache/**"]);
    }

    #[test]
    fn test_apply_mtime_resolution() {
        let mut config = Config::default();
        apply_config_value(&mut config, "remote.mtime_resolution", "seconds").unwrap();
        assert_eq!(config.remote.mtime_resolution, MtimeResolution::Seconds);
        assert!(apply_config_value(&mut config, "remote.mtime_resolution", "hours").is_err());
    }

    #[test]
    fn test_apply_paths() {
        let mut config = Config::default();
        apply_config_value(&mut config, "local.root", "/data/vault").unwrap();
        apply_config_value(&mut config, "state.db_path", "/data/state.db").unwrap();
        assert_eq!(config.local.root, PathBuf::from("/data/vault"));
        assert_eq!(config.state.db_path, PathBuf::from("/data/state.db"));
    }

    #[test]
    fn test_apply_allow_dot_paths() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.allow_dot_paths", "true").unwrap();
        assert!(config.sync.allow_dot_paths);
        assert!(apply_config_value(&mut config, "sync.allow_dot_paths", "yes").is_err());
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "unknown.key", "value").is_err());
    }

    #[test]
    fn test_masked_hides_password() {
        let mut config = Config::default();
        config.encryption.password = "hunter2".into();
        assert_eq!(masked(config).encryption.password, MASK);
        assert_eq!(masked(Config::default()).encryption.password, "");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.vault_id", "notes").unwrap();
        save(&path, &config).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sync.vault_id, "notes");
    }
}
