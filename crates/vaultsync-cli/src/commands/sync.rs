//! Sync command - Synchronize the local and remote replicas
//!
//! Provides the `vaultsync sync` CLI command which:
//! 1. Loads and validates configuration
//! 2. Derives the encryption key when a password is set
//! 3. Opens the state database and the two directory replicas
//! 4. Runs the SyncEngine and displays progress and results

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use vaultsync_core::config::Config;
use vaultsync_core::domain::{Decision, TriggerSource};
use vaultsync_crypto::Cipher;
use vaultsync_sync::{FsStorage, SyncEngine, SyncOutcome, SyncProgress, SyncStep};

use super::{load_config, open_store};
use crate::output::{format_duration, plural, GlobalOptions, OutputFormatter};

/// Environment variable that overrides `encryption.password`
pub const PASSWORD_ENV: &str = "VAULTSYNC_PASSWORD";

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Build and store the plan without making any change
    #[arg(long)]
    pub dry_run: bool,

    /// What started this run: manual, auto, startup or dry
    #[arg(long, default_value = "manual", value_parser = parse_trigger)]
    pub trigger: TriggerSource,

    /// Forget previous sync records first; both replicas are then
    /// compared as if seen for the first time
    #[arg(long)]
    pub reset_history: bool,
}

fn parse_trigger(value: &str) -> Result<TriggerSource, String> {
    value.parse::<TriggerSource>().map_err(|e| e.to_string())
}

impl SyncCommand {
    /// Trigger source of this invocation
    pub fn effective_trigger(&self) -> TriggerSource {
        if self.dry_run {
            TriggerSource::Dry
        } else {
            self.trigger
        }
    }

    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();

        // Step 1: configuration
        let (config_path, config) = load_config(options)?;
        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            anyhow::bail!(
                "Invalid configuration {} ({})",
                config_path.display(),
                plural(errors.len(), "error")
            );
        }

        // Step 2: encryption
        let password = resolve_password(&config, std::env::var(PASSWORD_ENV).ok());
        let cipher = match password {
            Some(password) => Some(
                tokio::task::spawn_blocking(move || Cipher::from_password(&password))
                    .await
                    .context("Key derivation task failed")?
                    .context("Failed to derive encryption key")?,
            ),
            None => None,
        };

        // Step 3: state and replicas
        let (pool, store) = open_store(&config).await?;
        let store = Arc::new(store);

        if self.reset_history {
            let removed = store
                .forget(&config.sync.vault_id, &config.sync.profile_id)
                .await
                .context("Failed to clear previous sync records")?;
            formatter.info(&format!(
                "Cleared {}",
                plural(usize::try_from(removed).unwrap_or(usize::MAX), "previous sync record")
            ));
        }

        let local = FsStorage::new(&config.local.root);
        let remote = FsStorage::new(&config.remote.root)
            .with_mtime_resolution(config.remote.mtime_resolution);
        remote
            .ensure_root()
            .await
            .with_context(|| format!("Failed to create {}", config.remote.root.display()))?;

        info!(
            local = %config.local.root.display(),
            remote = %config.remote.root.display(),
            encrypted = cipher.is_some(),
            "Replicas opened"
        );

        let engine = SyncEngine::new(
            Arc::new(local),
            Arc::new(remote),
            cipher,
            store.clone(),
            config.sync.clone(),
        )?
        .with_plan_store(store);

        // Step 4: run
        let progress = ConsoleProgress {
            enabled: !options.is_json() && !options.quiet,
        };
        let result = engine.run(self.effective_trigger(), &progress).await;
        pool.close().await;

        match result {
            Ok(outcome) => {
                if options.is_json() {
                    formatter.print_json(&serde_json::to_value(&outcome)?);
                } else {
                    print_outcome(formatter.as_ref(), &outcome);
                }
                Ok(())
            }
            Err(err) => {
                if options.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "success": false,
                        "error": err.to_string(),
                    }));
                }
                Err(err).context("Sync failed")
            }
        }
    }
}

/// Password in effect; the environment wins over the file, and an empty
/// value disables encryption
fn resolve_password(config: &Config, from_env: Option<String>) -> Option<String> {
    from_env
        .filter(|p| !p.is_empty())
        .or_else(|| Some(config.encryption.password.clone()))
        .filter(|p| !p.is_empty())
}

/// Step reporter writing to stderr
struct ConsoleProgress {
    enabled: bool,
}

impl SyncProgress for ConsoleProgress {
    fn on_step(&self, step: SyncStep) {
        if self.enabled {
            eprintln!("[{}/{}] {}", step.number(), SyncStep::COUNT, step.label());
        }
    }

    fn on_task(&self, index: usize, total: usize, key: &str, decision: Decision) {
        debug!(index, total, key, %decision, "Task settled");
    }
}

fn print_outcome(formatter: &dyn OutputFormatter, outcome: &SyncOutcome) {
    if outcome.dry {
        formatter.success(&format!(
            "Dry run: {} of {} planned, nothing applied",
            plural(outcome.changes, "change"),
            plural(outcome.total, "entry")
        ));
        for (decision, count) in &outcome.counts {
            formatter.info(&format!("{count:>5}  {decision}"));
        }
        formatter.info(&format!("Plan {}", outcome.run_id));
        return;
    }

    let duration = format_duration(outcome.duration_ms);
    if outcome.changes == 0 {
        formatter.success(&format!("Already up to date ({duration})"));
        return;
    }
    formatter.success(&format!("Sync completed in {duration}"));

    let summary = &outcome.summary;
    let lines = [
        ("Pushed", summary.pushed, "file"),
        ("Pulled", summary.pulled, "file"),
        ("Merged", summary.merged, "file"),
        ("Duplicated", summary.duplicated, "file"),
        ("Created", summary.folders_created, "folder"),
        ("Deleted", summary.deleted, "entry"),
        ("Skipped", summary.skipped, "entry"),
    ];
    for (label, count, noun) in lines {
        if count > 0 {
            formatter.info(&format!("{:<11} {}", format!("{label}:"), plural(count, noun)));
        }
    }
}
