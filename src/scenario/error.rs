//! Scenario framework errors.

use thiserror::Error;

use crate::graph::GraphError;
use crate::replay::ReplayError;
use crate::storage::StorageError;

/// Result type for scenario operations.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Errors raised while building, running or checking a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("invalid scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("invalid scenario: {0}")]
    InvalidDescription(String),

    /// The tree has a dependency cycle.
    #[error("graph is not acyclic: {dependency} is a dependency of {node}, but has been visited without being processed before it")]
    Cycle { node: String, dependency: String },

    #[error("unknown node `{node}` referenced by {referenced_by}")]
    UnknownNode { node: String, referenced_by: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// The binary under test exited unsuccessfully.
    #[error("`{command}` exited with {}:\n{output}", status_display(.status))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    /// The resulting graph does not have the expected shape.
    #[error("{0}")]
    Mismatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_display(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl ScenarioError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDescription(message.into())
    }

    /// The exit code a failed command reported, if that is what this is.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ScenarioError::CommandFailed { status, .. } => *status,
            _ => None,
        }
    }
}
