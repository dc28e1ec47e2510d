//! Domain entities and business rules
//!
//! This module contains the core domain types for vaultsync:
//! - Path key helpers (normalization, parents, depth)
//! - The per-side `Entity` observation and mtime rounding
//! - The closed decision vocabulary and its execution phases
//! - `MixedEntity` and the `SyncPlan` mapping
//! - Sync direction and conflict policy settings
//! - Domain-specific error types

pub mod decision;
pub mod entity;
pub mod errors;
pub mod key;
pub mod plan;
pub mod policy;

// Re-export commonly used types
pub use decision::{Decision, DecisionPhase};
pub use entity::{Entity, MtimeResolution};
pub use errors::DomainError;
pub use plan::{MixedEntity, PlanMeta, PlanSettings, SyncPlan, TriggerSource, PLAN_META_KEY};
pub use policy::{ConflictAction, SyncDirection};
