//! Sync plan types
//!
//! A `SyncPlan` maps every key to a `MixedEntity` (up to three
//! observations plus the decision) and carries one synthetic metadata
//! entry. It serializes as a single JSON object whose keys are the entry
//! keys plus `/$@meta`.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{Decision, DecisionPhase};
use super::entity::{Entity, MtimeResolution};
use super::errors::DomainError;
use super::key::is_folder_key;
use super::policy::{ConflictAction, SyncDirection};

/// Key under which plan metadata is stored
pub const PLAN_META_KEY: &str = "/$@meta";

// ============================================================================
// TriggerSource
// ============================================================================

/// What started a sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    #[default]
    Manual,
    Auto,
    Startup,
    /// Build and persist the plan, touch nothing
    Dry,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::Startup => "startup",
            Self::Dry => "dry",
        }
    }

    #[must_use]
    pub fn is_dry(self) -> bool {
        self == Self::Dry
    }
}

impl Display for TriggerSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSource {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            "startup" => Ok(Self::Startup),
            "dry" => Ok(Self::Dry),
            other => Err(DomainError::UnknownVariant {
                kind: "trigger source",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// MixedEntity
// ============================================================================

/// Per-key aggregate of the three observations and the chosen decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedEntity {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sync: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Identifier of the rule that produced the decision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_branch: Option<u32>,
    #[serde(default)]
    pub change: bool,
}

impl MixedEntity {
    /// Create an undecided entry with no observations
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            local: None,
            remote: None,
            prev_sync: None,
            decision: None,
            decision_branch: None,
            change: false,
        }
    }

    #[must_use]
    pub fn is_folder(&self) -> bool {
        is_folder_key(&self.key)
    }

    /// Record the decision and the rule that fired
    pub fn decide(&mut self, decision: Decision, branch: u32) {
        self.decision = Some(decision);
        self.decision_branch = Some(branch);
        self.change = decision.is_change();
    }
}

// ============================================================================
// PlanSettings / PlanMeta
// ============================================================================

/// Snapshot of the settings a plan was built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSettings {
    pub direction: SyncDirection,
    pub conflict_action: ConflictAction,
    pub concurrency: usize,
    pub skip_size_larger_than: i64,
    pub protect_modify_percentage: u8,
    pub mtime_resolution: MtimeResolution,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            direction: SyncDirection::default(),
            conflict_action: ConflictAction::default(),
            concurrency: 5,
            skip_size_larger_than: -1,
            protect_modify_percentage: 50,
            mtime_resolution: MtimeResolution::default(),
        }
    }
}

/// Synthetic metadata entry of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub trigger: TriggerSource,
    pub settings: PlanSettings,
    pub total: usize,
    pub changes: usize,
    /// Number of entries per decision
    pub counts: BTreeMap<String, usize>,
}

// ============================================================================
// SyncPlan
// ============================================================================

/// Key to decided `MixedEntity` mapping plus metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    #[serde(rename = "/$@meta")]
    pub meta: PlanMeta,
    #[serde(flatten)]
    pub entries: BTreeMap<String, MixedEntity>,
}

impl SyncPlan {
    /// Build a plan and compute its aggregate counts
    pub fn new(
        entries: BTreeMap<String, MixedEntity>,
        trigger: TriggerSource,
        settings: PlanSettings,
    ) -> Self {
        let mut counts = BTreeMap::new();
        let mut changes = 0;
        for entry in entries.values() {
            if let Some(decision) = entry.decision {
                *counts.entry(decision.as_str().to_string()).or_insert(0) += 1;
            }
            if entry.change {
                changes += 1;
            }
        }

        let meta = PlanMeta {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            trigger,
            settings,
            total: entries.len(),
            changes,
            counts,
        };

        Self { meta, entries }
    }

    /// Look up one entry
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MixedEntity> {
        self.entries.get(key)
    }

    /// Decision assigned to a key
    #[must_use]
    pub fn decision_of(&self, key: &str) -> Option<Decision> {
        self.entries.get(key).and_then(|e| e.decision)
    }

    /// Entries belonging to one executor phase
    pub fn in_phase(&self, phase: DecisionPhase) -> impl Iterator<Item = &MixedEntity> {
        self.entries
            .values()
            .filter(move |e| e.decision.map(Decision::phase) == Some(phase))
    }

    /// True if executing the plan would touch nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.meta.changes == 0
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// Returns an error if the JSON is not a plan
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
