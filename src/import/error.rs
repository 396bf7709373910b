//! Import command errors and their exit codes.

use thiserror::Error;

use crate::graph::GraphError;
use crate::replay::ReplayError;
use crate::storage::StorageError;

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Errors that can occur while importing upstream changes.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ImportError {
    /// Process exit code for this error.
    ///
    /// | code | meaning                    |
    /// |------|----------------------------|
    /// | 1    | any other failure          |
    /// | 2    | conflict                   |
    /// | 3    | invalid replay plan        |
    /// | 4    | not a repository           |
    /// | 5    | divergent history          |
    /// | 6    | nothing to replay          |
    /// | 7    | aborted by the hook        |
    /// | 8    | stopped for editing        |
    pub fn exit_code(&self) -> i32 {
        match self {
            ImportError::Storage(e) => storage_code(e),
            ImportError::Graph(e) => graph_code(e),
            ImportError::Replay(e) => match e {
                ReplayError::Conflict { .. } | ReplayError::UnresolvedConflicts { .. } => 2,
                ReplayError::PlanViolation { .. } => 3,
                ReplayError::NothingToReplay => 6,
                ReplayError::Aborted => 7,
                ReplayError::Stopped { .. } => 8,
                ReplayError::Storage(e) => storage_code(e),
                ReplayError::Graph(e) => graph_code(e),
                _ => 1,
            },
            ImportError::InvalidConfig(_) => 1,
        }
    }

    /// Check if the import halted and can be continued.
    pub fn is_resumable(&self) -> bool {
        matches!(self, ImportError::Replay(e) if e.is_resumable())
    }
}

fn storage_code(e: &StorageError) -> i32 {
    match e {
        StorageError::NotARepository(_) | StorageError::BareRepository(_) => 4,
        _ => 1,
    }
}

fn graph_code(e: &GraphError) -> i32 {
    match e {
        GraphError::DivergentHistory { .. } => 5,
        GraphError::Storage(e) => storage_code(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let cases: Vec<(ImportError, i32)> = vec![
            (StorageError::NotARepository(PathBuf::from("/tmp/x")).into(), 4),
            (StorageError::DetachedHead.into(), 1),
            (
                GraphError::DivergentHistory {
                    upstream: "upstream".into(),
                    head: "master".into(),
                }
                .into(),
                5,
            ),
            (ReplayError::violation("pick 1a2b3c4 X", "bad").into(), 3),
            (ReplayError::NothingToReplay.into(), 6),
            (ReplayError::Aborted.into(), 7),
            (ReplayError::UnresolvedConflicts { paths: vec![] }.into(), 2),
            (ReplayError::NoReplayInProgress.into(), 1),
            (ImportError::InvalidConfig("x".into()), 1),
        ];
        for (error, code) in cases {
            assert_eq!(error.exit_code(), code, "{}", error);
        }
    }

    #[test]
    fn test_resumable() {
        assert!(ImportError::from(ReplayError::UnresolvedConflicts { paths: vec![] }).is_resumable());
        assert!(!ImportError::from(ReplayError::NothingToReplay).is_resumable());
    }
}
