//! Storage layer error types
//!
//! All errors that can occur while querying or writing the repository are
//! defined here. We use `thiserror` for ergonomic error definition.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::types::InvalidNameError;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// no repository could be discovered at the working location
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// the repository has no working tree, but the operation needs one
    #[error("repository at {} has no working tree", .0.display())]
    BareRepository(PathBuf),

    /// tracked files have uncommitted changes
    #[error("working tree has uncommitted changes: {}", paths_display(.paths))]
    DirtyWorktree { paths: Vec<PathBuf> },

    /// untracked files are in the way of a checkout
    #[error("untracked working tree files would be overwritten: {}", paths_display(.paths))]
    UntrackedWouldBeOverwritten { paths: Vec<PathBuf> },

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// the revision does not name a commit
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// invalid branch name
    #[error("invalid branch name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// branch update failed because the ref moved underneath us
    #[error("concurrent modification: branch {branch} was updated by someone else")]
    ConcurrentModification { branch: String },

    /// HEAD does not point at a branch
    #[error("HEAD is detached")]
    DetachedHead,

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

pub(crate) fn paths_display(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RefNotFound(_) | StorageError::CommitNotFound(_)
        )
    }

    /// check if this error is a conflict with the current repository state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::BranchAlreadyExists(_)
                | StorageError::ConcurrentModification { .. }
                | StorageError::DirtyWorktree { .. }
                | StorageError::UntrackedWouldBeOverwritten { .. }
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
