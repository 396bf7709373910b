//! Graph error types.

use thiserror::Error;

use crate::storage::StorageError;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while reading or partitioning history.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The two refs share no history and no merge base was supplied.
    #[error("{upstream} and {head} have no common history; pass an explicit merge base")]
    DivergentHistory { upstream: String, head: String },
}

impl GraphError {
    /// Check if this error means a revision or ref does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            GraphError::Storage(e) => e.is_not_found(),
            GraphError::DivergentHistory { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divergent_message() {
        let err = GraphError::DivergentHistory {
            upstream: "upstream".to_string(),
            head: "master".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream and master have no common history; pass an explicit merge base"
        );
        assert!(!err.is_not_found());

        let missing: GraphError = StorageError::CommitNotFound("nope".to_string()).into();
        assert!(missing.is_not_found());
    }
}
