//! vaultsync Sync - Three-way reconciliation and plan execution
//!
//! Provides:
//! - Path filters (ignore globs, dot-path exclusion)
//! - The reconciler: local, remote and previous-sync observations in,
//!   one decision per key out
//! - The plan executor: phased, depth-ordered, bounded-concurrency
//!   execution with error aggregation and a protect-modify guard
//! - The sync engine tying walks, planning, persistence and execution
//!   into one run
//!
//! ## Modules
//!
//! - [`engine`] - Run entry point and step-numbered progress
//! - [`executor`] - Phase partitioning and the worker pool
//! - [`filesystem`] - Directory-backed `IStorage` implementation
//! - [`filter`] - Key exclusion rules
//! - [`reconciler`] - Ensembling and the decision table

pub mod engine;
pub mod executor;
pub mod filesystem;
pub mod filter;
pub mod progress;
pub mod reconciler;

pub use engine::{SyncEngine, SyncOutcome};
pub use executor::{check_protect, ExecutionSummary, PlanExecutor};
pub use filesystem::FsStorage;
pub use filter::PathFilter;
pub use progress::{NoProgress, SyncProgress, SyncStep};
pub use reconciler::{ReconcileSettings, Reconciler};

use thiserror::Error;

use vaultsync_conflict::ConflictError;
use vaultsync_core::domain::errors::DomainError;

/// Number of collected task failures that aborts a run
pub const ERROR_THRESHOLD: usize = 3;

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// A setup requirement was not met
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An ignore pattern is not a valid glob
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// An observation violates an entity invariant
    #[error("Ambiguous state for '{key}': {reason}")]
    AmbiguousState { key: String, reason: String },

    /// Folders were marked as kept but never visited
    #[error("Kept folders left unresolved after decision pass: {}", .0.join(", "))]
    LeftoverKeptFolders(Vec<String>),

    /// A combination the decision table does not cover
    #[error("Unexpected decision state for '{key}': {reason}")]
    UnexpectedDecision { key: String, reason: String },

    /// A two-sided change exceeds the size ceiling
    #[error("'{key}' changed on both sides and is {size} bytes, above the {limit} byte ceiling")]
    TooLargeConflict { key: String, size: u64, limit: u64 },

    /// The protect-modify-percentage guard tripped
    #[error(
        "Refusing to sync: {affected} of {total} files would be modified or deleted, \
         above the {threshold}% protection threshold"
    )]
    ProtectModifyTripped {
        affected: usize,
        total: usize,
        threshold: u8,
    },

    /// Task failures collected during a phase
    #[error("{}", format_aggregate(.errors, .threshold_reached))]
    Aggregate {
        errors: Vec<String>,
        threshold_reached: bool,
    },

    /// Conflict resolution setup failed
    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// A domain-level error propagated from vaultsync-core
    #[error("Domain error: {0}")]
    DomainError(DomainError),

    /// Storage, store or other adapter failure outside a task
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

fn format_aggregate(errors: &[String], threshold_reached: &bool) -> String {
    let mut out = format!("{} task(s) failed", errors.len());
    if *threshold_reached {
        out.push_str(&format!(
            "; reached the threshold of {ERROR_THRESHOLD} errors, remaining tasks cancelled"
        ));
    }
    for err in errors {
        out.push_str("\n  - ");
        out.push_str(err);
    }
    out
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::AmbiguousState { key, reason } => Self::AmbiguousState { key, reason },
            other => Self::DomainError(other),
        }
    }
}
