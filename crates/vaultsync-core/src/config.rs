//! Configuration module for vaultsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{ConflictAction, MtimeResolution, SyncDirection};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for vaultsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub encryption: EncryptionConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Reconciliation and execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Vault identifier; namespaces previous-sync records.
    pub vault_id: String,
    /// Profile identifier within the vault.
    pub profile_id: String,
    /// Which way changes may flow.
    pub direction: SyncDirection,
    /// How two-sided conflicts are settled in bidirectional mode.
    pub conflict_action: ConflictAction,
    /// Worker pool width per phase partition.
    pub concurrency: usize,
    /// Size ceiling in bytes; `0` or negative means unlimited.
    pub skip_size_larger_than: i64,
    /// Abort when more than this percentage of files would be modified or deleted.
    pub protect_modify_percentage: u8,
    /// Glob patterns of keys to exclude.
    pub ignore_paths: Vec<String>,
    /// Include keys with a `.`-prefixed component.
    pub allow_dot_paths: bool,
}

/// Local replica settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory holding the local replica.
    pub root: PathBuf,
}

/// Remote replica settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Directory backing the remote replica.
    pub root: PathBuf,
    /// Timestamp granularity the remote preserves.
    pub mtime_resolution: MtimeResolution,
}

/// End-to-end encryption settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Password for the remote replica. Empty disables encryption.
    pub password: String,
}

/// Persistent state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// SQLite database holding previous-sync records and plans.
    pub db_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/vaultsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vaultsync")
            .join("config.yaml")
    }

    /// Size ceiling as an option; `None` when unlimited.
    pub fn size_ceiling(&self) -> Option<u64> {
        self.sync.size_ceiling()
    }
}

impl SyncConfig {
    /// Size ceiling as an option; `None` when unlimited.
    pub fn size_ceiling(&self) -> Option<u64> {
        u64::try_from(self.skip_size_larger_than)
            .ok()
            .filter(|n| *n > 0)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            vault_id: "default".to_string(),
            profile_id: "default".to_string(),
            direction: SyncDirection::Bidirectional,
            conflict_action: ConflictAction::KeepNewer,
            concurrency: 5,
            skip_size_larger_than: -1,
            protect_modify_percentage: 50,
            ignore_paths: Vec::new(),
            allow_dot_paths: false,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Vault"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("vaultsync")
                .join("remote"),
            mtime_resolution: MtimeResolution::Millis,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("vaultsync")
                .join("state.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound for `sync.concurrency`.
pub const MAX_CONCURRENCY: usize = 32;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.vault_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "sync.vault_id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.sync.profile_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "sync.profile_id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.sync.concurrency == 0 || self.sync.concurrency > MAX_CONCURRENCY {
            errors.push(ValidationError {
                field: "sync.concurrency".into(),
                message: format!("must be between 1 and {MAX_CONCURRENCY}"),
            });
        }
        if self.sync.protect_modify_percentage > 100 {
            errors.push(ValidationError {
                field: "sync.protect_modify_percentage".into(),
                message: "must be between 0 and 100".into(),
            });
        }
        for pattern in &self.sync.ignore_paths {
            if let Err(e) = glob::Pattern::new(pattern) {
                errors.push(ValidationError {
                    field: "sync.ignore_paths".into(),
                    message: format!("invalid glob '{pattern}': {}", e.msg),
                });
            }
        }

        // --- local / remote ---
        if self.local.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "local.root".into(),
                message: "must not be empty".into(),
            });
        }
        if self.remote.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "remote.root".into(),
                message: "must not be empty".into(),
            });
        } else if self.remote.root == self.local.root {
            errors.push(ValidationError {
                field: "remote.root".into(),
                message: "must differ from local.root".into(),
            });
        }

        // --- state ---
        if self.state.db_path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "state.db_path".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid log level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`], starting from defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn vault_id(mut self, id: impl Into<String>) -> Self {
        self.config.sync.vault_id = id.into();
        self
    }

    pub fn profile_id(mut self, id: impl Into<String>) -> Self {
        self.config.sync.profile_id = id.into();
        self
    }

    pub fn direction(mut self, direction: SyncDirection) -> Self {
        self.config.sync.direction = direction;
        self
    }

    pub fn conflict_action(mut self, action: ConflictAction) -> Self {
        self.config.sync.conflict_action = action;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn skip_size_larger_than(mut self, bytes: i64) -> Self {
        self.config.sync.skip_size_larger_than = bytes;
        self
    }

    pub fn protect_modify_percentage(mut self, percent: u8) -> Self {
        self.config.sync.protect_modify_percentage = percent;
        self
    }

    pub fn ignore_path(mut self, pattern: impl Into<String>) -> Self {
        self.config.sync.ignore_paths.push(pattern.into());
        self
    }

    pub fn allow_dot_paths(mut self, allow: bool) -> Self {
        self.config.sync.allow_dot_paths = allow;
        self
    }

    // --- replicas ---

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.local.root = root;
        self
    }

    pub fn remote_root(mut self, root: PathBuf) -> Self {
        self.config.remote.root = root;
        self
    }

    pub fn remote_mtime_resolution(mut self, resolution: MtimeResolution) -> Self {
        self.config.remote.mtime_resolution = resolution;
        self
    }

    // --- encryption / state / logging ---

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.encryption.password = password.into();
        self
    }

    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.state.db_path = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
