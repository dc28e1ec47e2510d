//! Sync direction and conflict policy
//!
//! Both are configuration values that the reconciler reads; they live in
//! the domain because the decision table is expressed in terms of them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Which way changes are allowed to flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    Bidirectional,
    IncrementalPullOnly,
    IncrementalPushOnly,
    IncrementalPullAndDeleteOnly,
    IncrementalPushAndDeleteOnly,
}

impl SyncDirection {
    /// All directions, in declaration order
    pub const ALL: [SyncDirection; 5] = [
        Self::Bidirectional,
        Self::IncrementalPullOnly,
        Self::IncrementalPushOnly,
        Self::IncrementalPullAndDeleteOnly,
        Self::IncrementalPushAndDeleteOnly,
    ];

    /// Local changes may be uploaded
    #[must_use]
    pub fn can_push(self) -> bool {
        matches!(
            self,
            Self::Bidirectional | Self::IncrementalPushOnly | Self::IncrementalPushAndDeleteOnly
        )
    }

    /// Remote changes may be downloaded
    #[must_use]
    pub fn can_pull(self) -> bool {
        matches!(
            self,
            Self::Bidirectional | Self::IncrementalPullOnly | Self::IncrementalPullAndDeleteOnly
        )
    }

    /// Local deletions may be mirrored to the remote
    #[must_use]
    pub fn can_delete_remote(self) -> bool {
        matches!(self, Self::Bidirectional | Self::IncrementalPushAndDeleteOnly)
    }

    /// Remote deletions may be mirrored locally
    #[must_use]
    pub fn can_delete_local(self) -> bool {
        matches!(self, Self::Bidirectional | Self::IncrementalPullAndDeleteOnly)
    }

    /// True for every mode except bidirectional
    #[must_use]
    pub fn is_directional(self) -> bool {
        self != Self::Bidirectional
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::IncrementalPullOnly => "incremental_pull_only",
            Self::IncrementalPushOnly => "incremental_push_only",
            Self::IncrementalPullAndDeleteOnly => "incremental_pull_and_delete_only",
            Self::IncrementalPushAndDeleteOnly => "incremental_push_and_delete_only",
        }
    }
}

impl Display for SyncDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "sync direction",
                value: s.to_string(),
            })
    }
}

/// How a two-sided conflict is settled in bidirectional mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    /// Larger modification time wins
    #[default]
    KeepNewer,
    /// Larger encrypted size wins
    KeepLarger,
    /// Merge text, duplicate everything else
    SmartConflict,
}

impl ConflictAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepNewer => "keep_newer",
            Self::KeepLarger => "keep_larger",
            Self::SmartConflict => "smart_conflict",
        }
    }
}

impl Display for ConflictAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_newer" => Ok(Self::KeepNewer),
            "keep_larger" => Ok(Self::KeepLarger),
            "smart_conflict" => Ok(Self::SmartConflict),
            other => Err(DomainError::UnknownVariant {
                kind: "conflict action",
                value: other.to_string(),
            }),
        }
    }
}
