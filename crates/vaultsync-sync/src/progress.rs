//! Progress reporting for sync runs
//!
//! A run reports numbered steps and, while executing, one event per
//! settled task. Reporters are called from the engine's task only, so
//! they need no internal synchronization beyond `Send + Sync`.

use std::fmt::{self, Display, Formatter};

use vaultsync_core::domain::Decision;

/// Numbered steps of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SyncStep {
    WalkLocal = 1,
    WalkRemote = 2,
    LoadPrevSync = 3,
    BuildPlan = 4,
    PersistPlan = 5,
    ProtectCheck = 6,
    Execute = 7,
    Finish = 8,
}

impl SyncStep {
    /// Total number of steps
    pub const COUNT: u8 = 8;

    #[must_use]
    pub fn number(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::WalkLocal => "listing local files",
            Self::WalkRemote => "listing remote files",
            Self::LoadPrevSync => "loading previous sync records",
            Self::BuildPlan => "building sync plan",
            Self::PersistPlan => "saving sync plan",
            Self::ProtectCheck => "checking protection threshold",
            Self::Execute => "executing sync plan",
            Self::Finish => "finished",
        }
    }
}

impl Display for SyncStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.number(), Self::COUNT, self.label())
    }
}

/// Receiver of progress events
pub trait SyncProgress: Send + Sync {
    /// A new step started
    fn on_step(&self, _step: SyncStep) {}

    /// A task ran, successfully or not; `index` counts from 1
    fn on_task(&self, _index: usize, _total: usize, _key: &str, _decision: Decision) {}
}

/// Reporter that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl SyncProgress for NoProgress {}
