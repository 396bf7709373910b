//! Replay error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::GraphError;
use crate::storage::{paths_display, CommitId, StorageError};

/// Result type for replay operations.
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Errors that can occur while planning or replaying commits.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Graph layer error.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The plan, usually as edited by the sequence editor, is unusable.
    #[error("invalid replay plan at `{action}`: {reason}")]
    PlanViolation {
        /// The offending line or entry.
        action: String,
        reason: String,
    },

    /// A commit could not be applied cleanly; the replay is halted and can
    /// be resumed once the paths are resolved.
    #[error("could not apply {} {subject}: conflicts in {}", .commit.short(), paths_display(.paths))]
    Conflict {
        commit: CommitId,
        subject: String,
        paths: Vec<PathBuf>,
    },

    /// The replay paused on an `edit` entry.
    #[error("stopped at {} {subject} for editing", .commit.short())]
    Stopped { commit: CommitId, subject: String },

    /// Resume was requested while the index still has conflicts.
    #[error("unresolved conflicts remain in {}", paths_display(.paths))]
    UnresolvedConflicts { paths: Vec<PathBuf> },

    /// Every planned change is already on the target.
    #[error("nothing to replay: every planned change is already on the target")]
    NothingToReplay,

    /// The sequence editor exited unsuccessfully.
    #[error("sequence editor `{command}` failed{}", exit_display(.status))]
    HookFailed { command: String, status: Option<i32> },

    /// The sequence editor asked to abort.
    #[error("replay aborted by the sequence editor")]
    Aborted,

    /// Another replay is halted in this repository.
    #[error("a replay onto {target} is already in progress; continue or abort it first")]
    ReplayInProgress { target: String },

    /// Continue/abort was requested but nothing is halted.
    #[error("no replay in progress")]
    NoReplayInProgress,

    /// The persisted replay state is unreadable.
    #[error("corrupt replay state: {0}")]
    CorruptState(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_display(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!(" with exit status {}", code),
        None => " (terminated by signal)".to_string(),
    }
}

impl ReplayError {
    /// Build a plan violation for `action`.
    pub fn violation(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlanViolation {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Check if the replay is halted and resumable.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ReplayError::Conflict { .. } | ReplayError::Stopped { .. } | ReplayError::UnresolvedConflicts { .. }
        )
    }

    /// Check if this error is a conflict with the current repository state.
    pub fn is_conflict(&self) -> bool {
        match self {
            ReplayError::Conflict { .. } | ReplayError::UnresolvedConflicts { .. } => true,
            ReplayError::Storage(e) => e.is_conflict(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let commit = CommitId::from_hex("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        let conflict = ReplayError::Conflict {
            commit,
            subject: "Add feature".to_string(),
            paths: vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
        };
        assert_eq!(
            conflict.to_string(),
            "could not apply 1a2b3c4 Add feature: conflicts in a.txt, b.txt"
        );
        assert!(conflict.is_conflict());
        assert!(conflict.is_resumable());

        let hook = ReplayError::HookFailed {
            command: "false".to_string(),
            status: Some(1),
        };
        assert_eq!(hook.to_string(), "sequence editor `false` failed with exit status 1");
        assert!(!hook.is_resumable());

        let violation = ReplayError::violation("pick 1a2b3c4 Add feature", "placed before its ancestor");
        assert_eq!(
            violation.to_string(),
            "invalid replay plan at `pick 1a2b3c4 Add feature`: placed before its ancestor"
        );
    }
}
