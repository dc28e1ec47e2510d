//! Plan command - Inspect generated sync plans
//!
//! `vaultsync plan` prints the most recent plan of the configured vault
//! and profile; `--history` lists the retained runs instead.

use anyhow::{Context, Result};
use clap::Args;

use vaultsync_core::domain::SyncPlan;
use vaultsync_core::ports::IPlanStore;

use super::{load_config, open_store};
use crate::output::{plural, GlobalOptions, OutputFormatter};

#[derive(Debug, Args)]
pub struct PlanCommand {
    /// List retained plans, newest first
    #[arg(long)]
    pub history: bool,

    /// Maximum number of plans listed with --history
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Also list entries whose decision needs no work
    #[arg(long)]
    pub all: bool,
}

impl PlanCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let formatter = options.formatter();
        let (_, config) = load_config(options)?;
        let (pool, store) = open_store(&config).await?;
        let vault = config.sync.vault_id.as_str();
        let profile = config.sync.profile_id.as_str();

        if self.history {
            let records = store
                .recent_plans(vault, profile, self.limit)
                .await
                .context("Failed to list stored plans")?;
            pool.close().await;

            if options.is_json() {
                formatter.print_json(&serde_json::to_value(&records)?);
            } else if records.is_empty() {
                formatter.info("No plans stored yet");
            } else {
                formatter.success(&format!("{} for {vault}/{profile}", plural(records.len(), "plan")));
                for record in &records {
                    formatter.info(&format!(
                        "{}  {}  {:<8} {} / {}",
                        record.generated_at.format("%Y-%m-%d %H:%M:%S"),
                        record.run_id,
                        record.trigger.as_str(),
                        plural(record.changes, "change"),
                        plural(record.total, "entry"),
                    ));
                }
            }
            return Ok(());
        }

        let plan = store
            .latest_plan(vault, profile)
            .await
            .context("Failed to load latest plan")?;
        pool.close().await;

        let Some(plan) = plan else {
            if options.is_json() {
                formatter.print_json(&serde_json::Value::Null);
            } else {
                formatter.info("No plans stored yet. Run 'vaultsync sync --dry-run' to build one.");
            }
            return Ok(());
        };

        if options.is_json() {
            formatter.print_json(&serde_json::to_value(&plan)?);
        } else {
            print_plan(formatter.as_ref(), &plan, self.all);
        }
        Ok(())
    }
}

fn print_plan(formatter: &dyn OutputFormatter, plan: &SyncPlan, all: bool) {
    let meta = &plan.meta;
    formatter.success(&format!(
        "Plan {} ({}, {})",
        meta.run_id,
        meta.trigger,
        meta.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    formatter.info(&format!(
        "{} of {}, direction {}, conflicts {}",
        plural(meta.changes, "change"),
        plural(meta.total, "entry"),
        meta.settings.direction,
        meta.settings.conflict_action
    ));
    formatter.info("");

    for line in plan_lines(plan, all) {
        formatter.info(&line);
    }
}

/// One `decision  key` line per entry, changes only unless `all`
fn plan_lines(plan: &SyncPlan, all: bool) -> Vec<String> {
    plan.entries
        .values()
        .filter(|entry| all || entry.change)
        .filter_map(|entry| {
            entry
                .decision
                .map(|decision| format!("{:<48} {}", decision.as_str(), entry.key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use vaultsync_core::domain::{
        Decision, Entity, MixedEntity, PlanSettings, SyncPlan, TriggerSource,
    };

    use super::*;

    fn plan() -> SyncPlan {
        let mut entries = BTreeMap::new();
        let mut same = MixedEntity::new("same.md");
        same.local = Some(Entity::file("same.md", 1_000, 1));
        same.decide(Decision::Equal, 1);
        entries.insert("same.md".to_string(), same);

        let mut pushed = MixedEntity::new("new.md");
        pushed.local = Some(Entity::file("new.md", 1_000, 1));
        pushed.decide(Decision::LocalIsCreatedThenPush, 2);
        entries.insert("new.md".to_string(), pushed);

        SyncPlan::new(entries, TriggerSource::Dry, PlanSettings::default())
    }

    #[test]
    fn test_plan_lines_show_changes_only() {
        let lines = plan_lines(&plan(), false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("local_is_created_then_push"));
        assert!(lines[0].ends_with("new.md"));
    }

    #[test]
    fn test_plan_lines_all() {
        assert_eq!(plan_lines(&plan(), true).len(), 2);
    }
}
