//! Comparing a replayed graph against the expected nodes.

use crate::graph::CommitRange;
use crate::scenario::error::{ScenarioError, ScenarioResult};
use crate::storage::CommitInfo;

/// The commits a run produced, oldest first.
#[derive(Debug, Clone)]
pub struct ActualGraph {
    /// the revision range the commits were read from
    pub compared: String,
    pub commits: CommitRange,
}

impl ActualGraph {
    pub fn new(compared: impl Into<String>, commits: CommitRange) -> Self {
        Self {
            compared: compared.into(),
            commits,
        }
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn subjects(&self) -> Vec<&str> {
        self.commits.subjects()
    }
}

/// Check that `actual` holds one commit per expected node, with matching
/// subjects. `expected` is oldest first.
pub fn assert_matches(expected: &[(String, CommitInfo)], actual: &ActualGraph) -> ScenarioResult<()> {
    if expected.len() != actual.len() {
        let seen: Vec<String> = actual
            .commits
            .iter()
            .rev()
            .map(|c| format!("{}:{}", c.id, c.subject()))
            .collect();
        return Err(ScenarioError::Mismatch(format!(
            "should only have seen {} changes in {}, got {}: {}",
            expected.len(),
            actual.compared,
            actual.len(),
            seen.join(", ")
        )));
    }

    for ((node, node_commit), commit) in expected.iter().rev().zip(actual.commits.iter().rev()) {
        if commit.subject() != node_commit.subject() {
            return Err(ScenarioError::Mismatch(format!(
                "subject '{}' of commit '{}' does not match subject '{}' of node '{}'",
                commit.subject(),
                commit.id,
                node_commit.subject(),
                node
            )));
        }
    }
    Ok(())
}
