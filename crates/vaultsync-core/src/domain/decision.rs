//! Decision vocabulary
//!
//! Every key in a plan gets exactly one `Decision`. The vocabulary is
//! closed; each variant knows which executor phase runs it and how it
//! feeds the kept-folder propagation and the protect-modify guard.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// DecisionPhase
// ============================================================================

/// Executor phase a decision belongs to, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPhase {
    /// No I/O; may refresh the previous-sync record
    MarkSynced,
    /// Folder creation, shallowest first
    FolderCreation,
    /// File and folder deletion, deepest first
    Deletion,
    /// Upload, download, merge and duplicate
    Transfer,
}

impl Display for DecisionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MarkSynced => "mark_synced",
            Self::FolderCreation => "folder_creation",
            Self::Deletion => "deletion",
            Self::Transfer => "transfer",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Outcome chosen for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    OnlyHistory,
    Equal,
    LocalIsModifiedThenPush,
    RemoteIsModifiedThenPull,
    LocalIsCreatedThenPush,
    RemoteIsCreatedThenPull,
    LocalIsDeletedThusAlsoDeleteRemote,
    RemoteIsDeletedThusAlsoDeleteLocal,
    LocalIsCreatedTooLargeThenDoNothing,
    RemoteIsCreatedTooLargeThenDoNothing,
    LocalIsModifiedTooLargeThenDoNothing,
    RemoteIsModifiedTooLargeThenDoNothing,
    LocalIsCreatedButPullOnlyThenDoNothing,
    LocalIsModifiedButPullOnlyThenDoNothing,
    RemoteIsCreatedButPushOnlyThenDoNothing,
    RemoteIsModifiedButPushOnlyThenDoNothing,
    LocalIsDeletedButRemoteKeptThenDoNothing,
    RemoteIsDeletedButLocalKeptThenDoNothing,
    ConflictCreatedThenKeepLocal,
    ConflictCreatedThenKeepRemote,
    ConflictCreatedThenSmartConflict,
    ConflictModifiedThenKeepLocal,
    ConflictModifiedThenKeepRemote,
    ConflictModifiedThenSmartConflict,
    FolderExistedBothThenDoNothing,
    FolderExistedLocalThenAlsoCreateRemote,
    FolderExistedRemoteThenAlsoCreateLocal,
    FolderToBeDeletedOnLocal,
    FolderToBeDeletedOnRemote,
    FolderToSkip,
}

impl Decision {
    /// Every decision, in declaration order
    pub const ALL: [Decision; 30] = [
        Self::OnlyHistory,
        Self::Equal,
        Self::LocalIsModifiedThenPush,
        Self::RemoteIsModifiedThenPull,
        Self::LocalIsCreatedThenPush,
        Self::RemoteIsCreatedThenPull,
        Self::LocalIsDeletedThusAlsoDeleteRemote,
        Self::RemoteIsDeletedThusAlsoDeleteLocal,
        Self::LocalIsCreatedTooLargeThenDoNothing,
        Self::RemoteIsCreatedTooLargeThenDoNothing,
        Self::LocalIsModifiedTooLargeThenDoNothing,
        Self::RemoteIsModifiedTooLargeThenDoNothing,
        Self::LocalIsCreatedButPullOnlyThenDoNothing,
        Self::LocalIsModifiedButPullOnlyThenDoNothing,
        Self::RemoteIsCreatedButPushOnlyThenDoNothing,
        Self::RemoteIsModifiedButPushOnlyThenDoNothing,
        Self::LocalIsDeletedButRemoteKeptThenDoNothing,
        Self::RemoteIsDeletedButLocalKeptThenDoNothing,
        Self::ConflictCreatedThenKeepLocal,
        Self::ConflictCreatedThenKeepRemote,
        Self::ConflictCreatedThenSmartConflict,
        Self::ConflictModifiedThenKeepLocal,
        Self::ConflictModifiedThenKeepRemote,
        Self::ConflictModifiedThenSmartConflict,
        Self::FolderExistedBothThenDoNothing,
        Self::FolderExistedLocalThenAlsoCreateRemote,
        Self::FolderExistedRemoteThenAlsoCreateLocal,
        Self::FolderToBeDeletedOnLocal,
        Self::FolderToBeDeletedOnRemote,
        Self::FolderToSkip,
    ];

    /// Wire name of the decision
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OnlyHistory => "only_history",
            Self::Equal => "equal",
            Self::LocalIsModifiedThenPush => "local_is_modified_then_push",
            Self::RemoteIsModifiedThenPull => "remote_is_modified_then_pull",
            Self::LocalIsCreatedThenPush => "local_is_created_then_push",
            Self::RemoteIsCreatedThenPull => "remote_is_created_then_pull",
            Self::LocalIsDeletedThusAlsoDeleteRemote => "local_is_deleted_thus_also_delete_remote",
            Self::RemoteIsDeletedThusAlsoDeleteLocal => "remote_is_deleted_thus_also_delete_local",
            Self::LocalIsCreatedTooLargeThenDoNothing => {
                "local_is_created_too_large_then_do_nothing"
            }
            Self::RemoteIsCreatedTooLargeThenDoNothing => {
                "remote_is_created_too_large_then_do_nothing"
            }
            Self::LocalIsModifiedTooLargeThenDoNothing => {
                "local_is_modified_too_large_then_do_nothing"
            }
            Self::RemoteIsModifiedTooLargeThenDoNothing => {
                "remote_is_modified_too_large_then_do_nothing"
            }
            Self::LocalIsCreatedButPullOnlyThenDoNothing => {
                "local_is_created_but_pull_only_then_do_nothing"
            }
            Self::LocalIsModifiedButPullOnlyThenDoNothing => {
                "local_is_modified_but_pull_only_then_do_nothing"
            }
            Self::RemoteIsCreatedButPushOnlyThenDoNothing => {
                "remote_is_created_but_push_only_then_do_nothing"
            }
            Self::RemoteIsModifiedButPushOnlyThenDoNothing => {
                "remote_is_modified_but_push_only_then_do_nothing"
            }
            Self::LocalIsDeletedButRemoteKeptThenDoNothing => {
                "local_is_deleted_but_remote_kept_then_do_nothing"
            }
            Self::RemoteIsDeletedButLocalKeptThenDoNothing => {
                "remote_is_deleted_but_local_kept_then_do_nothing"
            }
            Self::ConflictCreatedThenKeepLocal => "conflict_created_then_keep_local",
            Self::ConflictCreatedThenKeepRemote => "conflict_created_then_keep_remote",
            Self::ConflictCreatedThenSmartConflict => "conflict_created_then_smart_conflict",
            Self::ConflictModifiedThenKeepLocal => "conflict_modified_then_keep_local",
            Self::ConflictModifiedThenKeepRemote => "conflict_modified_then_keep_remote",
            Self::ConflictModifiedThenSmartConflict => "conflict_modified_then_smart_conflict",
            Self::FolderExistedBothThenDoNothing => "folder_existed_both_then_do_nothing",
            Self::FolderExistedLocalThenAlsoCreateRemote => {
                "folder_existed_local_then_also_create_remote"
            }
            Self::FolderExistedRemoteThenAlsoCreateLocal => {
                "folder_existed_remote_then_also_create_local"
            }
            Self::FolderToBeDeletedOnLocal => "folder_to_be_deleted_on_local",
            Self::FolderToBeDeletedOnRemote => "folder_to_be_deleted_on_remote",
            Self::FolderToSkip => "folder_to_skip",
        }
    }

    /// Executor phase for this decision
    #[must_use]
    pub fn phase(self) -> DecisionPhase {
        match self {
            Self::FolderExistedLocalThenAlsoCreateRemote
            | Self::FolderExistedRemoteThenAlsoCreateLocal => DecisionPhase::FolderCreation,

            Self::LocalIsDeletedThusAlsoDeleteRemote
            | Self::RemoteIsDeletedThusAlsoDeleteLocal
            | Self::FolderToBeDeletedOnLocal
            | Self::FolderToBeDeletedOnRemote => DecisionPhase::Deletion,

            Self::LocalIsModifiedThenPush
            | Self::RemoteIsModifiedThenPull
            | Self::LocalIsCreatedThenPush
            | Self::RemoteIsCreatedThenPull
            | Self::ConflictCreatedThenKeepLocal
            | Self::ConflictCreatedThenKeepRemote
            | Self::ConflictCreatedThenSmartConflict
            | Self::ConflictModifiedThenKeepLocal
            | Self::ConflictModifiedThenKeepRemote
            | Self::ConflictModifiedThenSmartConflict => DecisionPhase::Transfer,

            _ => DecisionPhase::MarkSynced,
        }
    }

    /// Executing the decision mutates at least one side
    #[must_use]
    pub fn is_change(self) -> bool {
        self.phase() != DecisionPhase::MarkSynced
    }

    /// The entry still exists on at least one side after the run
    #[must_use]
    pub fn keeps_entry(self) -> bool {
        self != Self::OnlyHistory && self.phase() != DecisionPhase::Deletion
    }

    /// Counts towards the protect-modify-percentage guard
    #[must_use]
    pub fn counts_as_modification(self) -> bool {
        matches!(
            self,
            Self::LocalIsModifiedThenPush
                | Self::RemoteIsModifiedThenPull
                | Self::LocalIsDeletedThusAlsoDeleteRemote
                | Self::RemoteIsDeletedThusAlsoDeleteLocal
        ) || self.is_conflict()
    }

    /// Both sides changed since the previous sync
    #[must_use]
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            Self::ConflictCreatedThenKeepLocal
                | Self::ConflictCreatedThenKeepRemote
                | Self::ConflictCreatedThenSmartConflict
                | Self::ConflictModifiedThenKeepLocal
                | Self::ConflictModifiedThenKeepRemote
                | Self::ConflictModifiedThenSmartConflict
        )
    }

    /// Deferred to the conflict resolver
    #[must_use]
    pub fn is_smart_conflict(self) -> bool {
        matches!(
            self,
            Self::ConflictCreatedThenSmartConflict | Self::ConflictModifiedThenSmartConflict
        )
    }

    /// Local content overwrites the remote
    #[must_use]
    pub fn is_push(self) -> bool {
        matches!(
            self,
            Self::LocalIsModifiedThenPush
                | Self::LocalIsCreatedThenPush
                | Self::ConflictCreatedThenKeepLocal
                | Self::ConflictModifiedThenKeepLocal
        )
    }

    /// Remote content overwrites the local
    #[must_use]
    pub fn is_pull(self) -> bool {
        matches!(
            self,
            Self::RemoteIsModifiedThenPull
                | Self::RemoteIsCreatedThenPull
                | Self::ConflictCreatedThenKeepRemote
                | Self::ConflictModifiedThenKeepRemote
        )
    }

    /// A one-sided change left alone because of the size ceiling
    #[must_use]
    pub fn is_too_large(self) -> bool {
        matches!(
            self,
            Self::LocalIsCreatedTooLargeThenDoNothing
                | Self::RemoteIsCreatedTooLargeThenDoNothing
                | Self::LocalIsModifiedTooLargeThenDoNothing
                | Self::RemoteIsModifiedTooLargeThenDoNothing
        )
    }

    /// A change withheld by the sync direction or the size ceiling
    ///
    /// Such entries keep whatever previous-sync record they had, so the
    /// change is reconsidered on the next run.
    #[must_use]
    pub fn is_withheld(self) -> bool {
        self.is_too_large()
            || matches!(
                self,
                Self::LocalIsCreatedButPullOnlyThenDoNothing
                    | Self::LocalIsModifiedButPullOnlyThenDoNothing
                    | Self::RemoteIsCreatedButPushOnlyThenDoNothing
                    | Self::RemoteIsModifiedButPushOnlyThenDoNothing
                    | Self::LocalIsDeletedButRemoteKeptThenDoNothing
                    | Self::RemoteIsDeletedButLocalKeptThenDoNothing
                    | Self::FolderToSkip
            )
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "decision",
                value: s.to_string(),
            })
    }
}
