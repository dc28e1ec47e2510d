//! Sync engine
//!
//! The [`SyncEngine`] runs one synchronization between a local and a
//! remote [`IStorage`], numbered as eight progress steps:
//!
//! 1. **Walk local**: list the local replica
//! 2. **Walk remote**: list the remote replica through the encryption
//!    adapter, which also warms its name cache
//! 3. **Load history**: previous-sync records of this vault and profile
//! 4. **Plan**: reconcile the three lists into one decision per key
//! 5. **Persist**: store the plan; a dry run stops here
//! 6. **Protect**: refuse plans that modify too large a share of files
//! 7. **Execute**: apply the plan phase by phase
//! 8. **Finish**: report the outcome

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use vaultsync_core::config::SyncConfig;
use vaultsync_core::domain::{MtimeResolution, PlanSettings, SyncPlan, TriggerSource};
use vaultsync_core::ports::{IPlanStore, IPrevSyncStore, IStorage};
use vaultsync_crypto::{Cipher, EncryptedStorage};

use crate::executor::{check_protect, ExecutionSummary, PlanExecutor};
use crate::filter::PathFilter;
use crate::progress::{SyncProgress, SyncStep};
use crate::reconciler::{ReconcileSettings, Reconciler};
use crate::SyncError;

// ============================================================================
// SyncOutcome
// ============================================================================

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub run_id: Uuid,
    pub trigger: TriggerSource,
    /// The plan was built and stored but not executed
    pub dry: bool,
    /// Number of keys in the plan
    pub total: usize,
    /// Number of keys whose decision required work
    pub changes: usize,
    /// Number of keys per decision
    pub counts: BTreeMap<String, usize>,
    pub summary: ExecutionSummary,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl SyncOutcome {
    fn new(plan: &SyncPlan, dry: bool, summary: ExecutionSummary, start: Instant) -> Self {
        Self {
            run_id: plan.meta.run_id,
            trigger: plan.meta.trigger,
            dry,
            total: plan.meta.total,
            changes: plan.meta.changes,
            counts: plan.meta.counts.clone(),
            summary,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Three-way synchronization between two replicas
///
/// ## Dependencies
///
/// - `local`: the local replica
/// - `remote`: the raw remote replica; wrapped in the encryption adapter
///   at the start of every run
/// - `prev_sync`: previous-sync records and merge bases
/// - `plan_store`: optional persistence of generated plans
pub struct SyncEngine {
    local: Arc<dyn IStorage>,
    remote: Arc<dyn IStorage>,
    cipher: Option<Cipher>,
    prev_sync: Arc<dyn IPrevSyncStore>,
    plan_store: Option<Arc<dyn IPlanStore>>,
    config: SyncConfig,
    filter: PathFilter,
}

impl SyncEngine {
    /// Creates a new `SyncEngine`
    ///
    /// # Errors
    /// Returns [`SyncError::Precondition`] for an empty vault or profile
    /// id and [`SyncError::InvalidPattern`] for a bad ignore pattern.
    pub fn new(
        local: Arc<dyn IStorage>,
        remote: Arc<dyn IStorage>,
        cipher: Option<Cipher>,
        prev_sync: Arc<dyn IPrevSyncStore>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        if config.vault_id.trim().is_empty() {
            return Err(SyncError::Precondition("vault id must not be empty".into()));
        }
        if config.profile_id.trim().is_empty() {
            return Err(SyncError::Precondition("profile id must not be empty".into()));
        }
        let filter = PathFilter::from_config(&config)?;

        Ok(Self {
            local,
            remote,
            cipher,
            prev_sync,
            plan_store: None,
            config,
            filter,
        })
    }

    /// Persist every generated plan to the given store
    #[must_use]
    pub fn with_plan_store(mut self, store: Arc<dyn IPlanStore>) -> Self {
        self.plan_store = Some(store);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one synchronization
    ///
    /// # Errors
    /// Any failing step aborts the run. Task failures during execution are
    /// reported as [`SyncError::Aggregate`].
    #[tracing::instrument(
        skip(self, progress),
        fields(vault = %self.config.vault_id, profile = %self.config.profile_id)
    )]
    pub async fn run(
        &self,
        trigger: TriggerSource,
        progress: &dyn SyncProgress,
    ) -> Result<SyncOutcome, SyncError> {
        let result = self.run_steps(trigger, progress).await;
        if let Err(err) = &result {
            error!(error = %err, "Sync run failed");
        }
        result
    }

    async fn run_steps(
        &self,
        trigger: TriggerSource,
        progress: &dyn SyncProgress,
    ) -> Result<SyncOutcome, SyncError> {
        let start = Instant::now();
        let vault = self.config.vault_id.as_str();
        let profile = self.config.profile_id.as_str();

        info!(
            %trigger,
            direction = %self.config.direction,
            encrypted = self.cipher.is_some(),
            "Starting sync run"
        );

        // Step 1: local listing
        progress.on_step(SyncStep::WalkLocal);
        let local_entities = self
            .local
            .walk()
            .await
            .context("Failed to walk local storage")?;

        // Step 2: remote listing through a fresh encryption adapter
        progress.on_step(SyncStep::WalkRemote);
        let cold = EncryptedStorage::with_cipher(Arc::clone(&self.remote), self.cipher.clone());
        let (remote, remote_entities) =
            cold.walk().await.context("Failed to walk remote storage")?;
        let names = remote.name_snapshot().await;

        info!(
            local = local_entities.len(),
            remote = remote_entities.len(),
            "Replicas listed"
        );

        // Step 3: history
        progress.on_step(SyncStep::LoadPrevSync);
        let prev_entities = self
            .prev_sync
            .get_all(vault, profile)
            .await
            .context("Failed to load previous sync records")?;

        // Step 4: decisions
        progress.on_step(SyncStep::BuildPlan);
        let resolution = self
            .local
            .mtime_resolution()
            .coarsest(remote.mtime_resolution());
        let settings = ReconcileSettings::from_config(&self.config, resolution);
        let entries = Reconciler::new(settings, &self.filter, &names).reconcile(
            local_entities,
            prev_entities,
            remote_entities,
        )?;
        let plan = SyncPlan::new(entries, trigger, self.plan_settings(resolution));

        info!(
            run_id = %plan.meta.run_id,
            total = plan.meta.total,
            changes = plan.meta.changes,
            "Plan built"
        );

        // Step 5: persistence
        progress.on_step(SyncStep::PersistPlan);
        if let Some(store) = &self.plan_store {
            store
                .save_plan(vault, profile, &plan)
                .await
                .context("Failed to persist sync plan")?;
        }

        if trigger.is_dry() {
            info!(run_id = %plan.meta.run_id, "Dry run, plan not executed");
            progress.on_step(SyncStep::Finish);
            return Ok(SyncOutcome::new(
                &plan,
                true,
                ExecutionSummary::default(),
                start,
            ));
        }

        // Step 6: protect guard
        progress.on_step(SyncStep::ProtectCheck);
        check_protect(&plan, self.config.protect_modify_percentage)?;

        // Step 7: execution
        progress.on_step(SyncStep::Execute);
        if plan.is_noop() {
            info!("No changes, refreshing history only");
        }
        let summary = self
            .executor(Arc::new(remote))
            .execute(&plan, progress)
            .await?;

        // Step 8
        progress.on_step(SyncStep::Finish);
        let outcome = SyncOutcome::new(&plan, false, summary, start);
        info!(
            run_id = %outcome.run_id,
            changes = outcome.changes,
            duration_ms = outcome.duration_ms,
            "Sync run completed"
        );
        Ok(outcome)
    }

    fn executor(&self, remote: Arc<dyn IStorage>) -> PlanExecutor {
        PlanExecutor::new(
            Arc::clone(&self.local),
            remote,
            Arc::clone(&self.prev_sync),
            self.config.vault_id.clone(),
            self.config.profile_id.clone(),
            self.config.concurrency,
        )
    }

    fn plan_settings(&self, mtime_resolution: MtimeResolution) -> PlanSettings {
        PlanSettings {
            direction: self.config.direction,
            conflict_action: self.config.conflict_action,
            concurrency: self.config.concurrency,
            skip_size_larger_than: self.config.skip_size_larger_than,
            protect_modify_percentage: self.config.protect_modify_percentage,
            mtime_resolution,
        }
    }
}
