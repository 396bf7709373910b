//! Declarative scenario descriptions.
//!
//! ```yaml
//! description: local changes on top of a simple upstream
//! tree:
//!   - [A, []]
//!   - [B, [A]]
//!   - [C, [B]]
//!   - [D, [B]]
//!   - [E, [D]]
//! branches:
//!   upstream: [upstream, C]
//!   head: [master, E]
//! expect:
//!   range: [D, E]
//!   rebased: [D, E]
//! ```
//!
//! A parent written `=P` makes a merge take the tree of `P` instead of
//! combining all parents. A node named `<X><n>` is a cherry-pick of
//! `<X><n-1>` (`D1` copies `D`, `D2` copies `D1`) when that node exists.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::scenario::error::{ScenarioError, ScenarioResult};

/// Role of the branch being imported.
pub const UPSTREAM_ROLE: &str = "upstream";
/// Role of the branch receiving the replay.
pub const HEAD_ROLE: &str = "head";

/// A whole scenario.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDescription {
    #[serde(default)]
    pub description: String,
    /// `[node, [parents...]]`, in any order
    pub tree: Vec<(String, Vec<String>)>,
    /// role -> `[branch name, node]`
    #[serde(default)]
    pub branches: BTreeMap<String, (String, String)>,
    #[serde(default)]
    pub replay: ReplaySpec,
    /// arguments for the binary when run as a command
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub expect: Expectations,
}

/// How to drive a direct replay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaySpec {
    #[serde(default)]
    pub mode: ScenarioMode,
    /// branch created at upstream's tip to receive the commits
    pub target: Option<String>,
    /// node used instead of the computed merge base
    pub merge_base: Option<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub reword: BTreeMap<String, String>,
    #[serde(default)]
    pub squash: Vec<String>,
    /// new relative order of the named nodes
    #[serde(default)]
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioMode {
    #[default]
    Automated,
    Interactive,
}

/// What the scenario should end up with.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectations {
    /// nodes `resolve(upstream, head)` yields, oldest first
    pub range: Option<Vec<String>>,
    /// nodes whose subjects the replayed commits carry, oldest first
    pub rebased: Option<Vec<String>>,
    pub error: Option<ExpectedError>,
    /// revision range holding the replayed commits, e.g. `upstream..master^2`
    pub compare: Option<String>,
}

/// A failure the scenario expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedError {
    DivergentHistory,
    PlanViolation,
    NothingToReplay,
    Conflict,
}

impl ExpectedError {
    /// The binary's exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExpectedError::Conflict => 2,
            ExpectedError::PlanViolation => 3,
            ExpectedError::DivergentHistory => 5,
            ExpectedError::NothingToReplay => 6,
        }
    }
}

impl fmt::Display for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpectedError::DivergentHistory => "divergent-history",
            ExpectedError::PlanViolation => "plan-violation",
            ExpectedError::NothingToReplay => "nothing-to-replay",
            ExpectedError::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// One parent reference of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef<'a> {
    pub node: &'a str,
    /// `=` prefix: the merge takes this parent's tree
    pub keep_tree: bool,
}

impl<'a> ParentRef<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.strip_prefix('=') {
            Some(node) => Self { node, keep_tree: true },
            None => Self {
                node: raw,
                keep_tree: false,
            },
        }
    }
}

/// The node `node` is a cherry-pick of, by name: `D1` -> `D`, `D2` -> `D1`.
pub fn copy_source(node: &str) -> Option<String> {
    let stem = node.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.is_empty() || stem.len() == node.len() {
        return None;
    }
    let number: u64 = node[stem.len()..].parse().ok()?;
    match number {
        0 => None,
        1 => Some(stem.to_string()),
        n => Some(format!("{}{}", stem, n - 1)),
    }
}

impl ScenarioDescription {
    pub fn from_yaml(text: &str) -> ScenarioResult<Self> {
        let description: Self = serde_yaml_ng::from_str(text)?;
        description.validate()?;
        Ok(description)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ScenarioResult<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn has_node(&self, node: &str) -> bool {
        self.tree.iter().any(|(name, _)| name == node)
    }

    /// Parents of `node` as written.
    pub fn parents_of(&self, node: &str) -> Option<&[String]> {
        self.tree
            .iter()
            .find(|(name, _)| name == node)
            .map(|(_, parents)| parents.as_slice())
    }

    /// The node `node` copies, when it is a cherry-pick of a defined node.
    pub fn copied_node(&self, node: &str) -> Option<String> {
        copy_source(node).filter(|source| self.has_node(source))
    }

    /// Branch name and node for `role`.
    pub fn branch(&self, role: &str) -> ScenarioResult<(&str, &str)> {
        self.branches
            .get(role)
            .map(|(name, node)| (name.as_str(), node.as_str()))
            .ok_or_else(|| ScenarioError::invalid(format!("no `{}` branch defined", role)))
    }

    /// Check that every reference names a defined node.
    pub fn validate(&self) -> ScenarioResult<()> {
        if self.tree.is_empty() {
            return Err(ScenarioError::invalid("the tree is empty"));
        }
        let mut seen = HashSet::new();
        for (node, _) in &self.tree {
            if !seen.insert(node.as_str()) {
                return Err(ScenarioError::invalid(format!("node `{}` is defined more than once", node)));
            }
        }
        if !self.tree.iter().any(|(_, parents)| parents.is_empty()) {
            return Err(ScenarioError::invalid("no root commit defined"));
        }

        let known = |node: &str, referenced_by: String| {
            if seen.contains(node) {
                Ok(())
            } else {
                Err(ScenarioError::UnknownNode {
                    node: node.to_string(),
                    referenced_by,
                })
            }
        };
        for (node, parents) in &self.tree {
            for parent in parents {
                known(ParentRef::parse(parent).node, format!("node {}", node))?;
            }
        }
        for (role, (_, node)) in &self.branches {
            known(node, format!("branch role {}", role))?;
        }

        let replay = &self.replay;
        let edited = replay
            .drop
            .iter()
            .chain(replay.squash.iter())
            .chain(replay.order.iter())
            .chain(replay.reword.keys())
            .chain(replay.merge_base.iter());
        for node in edited {
            known(node, "replay".to_string())?;
        }
        let expected = self
            .expect
            .range
            .iter()
            .flatten()
            .chain(self.expect.rebased.iter().flatten());
        for node in expected {
            known(node, "expect".to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
description: merge of a previous import
tree:
  - [A, []]
  - [B, [A]]
  - [M, ["=B", A]]
  - [B1, [A]]
branches:
  upstream: [upstream, B]
  head: [master, M]
replay:
  mode: interactive
  drop: [B1]
  reword: { B: "New subject" }
expect:
  rebased: [B]
  error: nothing-to-replay
"#;

    #[test]
    fn test_parse_description() {
        let description = ScenarioDescription::from_yaml(SAMPLE).unwrap();
        assert_eq!(description.tree.len(), 4);
        assert_eq!(description.tree[2], ("M".to_string(), vec!["=B".to_string(), "A".to_string()]));
        assert_eq!(description.branch(HEAD_ROLE).unwrap(), ("master", "M"));
        assert_eq!(description.replay.mode, ScenarioMode::Interactive);
        assert_eq!(description.replay.reword.get("B").map(String::as_str), Some("New subject"));
        assert_eq!(description.expect.error, Some(ExpectedError::NothingToReplay));
        assert_eq!(description.copied_node("B1").as_deref(), Some("B"));
        assert!(description.branch("other").is_err());
    }

    #[test]
    fn test_parent_ref() {
        assert_eq!(ParentRef::parse("=E"), ParentRef { node: "E", keep_tree: true });
        assert_eq!(ParentRef::parse("C"), ParentRef { node: "C", keep_tree: false });
    }

    #[test]
    fn test_copy_source() {
        assert_eq!(copy_source("D1").as_deref(), Some("D"));
        assert_eq!(copy_source("D2").as_deref(), Some("D1"));
        assert_eq!(copy_source("D12").as_deref(), Some("D11"));
        assert_eq!(copy_source("D"), None);
        assert_eq!(copy_source("7"), None);
        assert_eq!(copy_source("D0"), None);
    }

    #[test]
    fn test_invalid_descriptions() {
        let unknown = "tree:\n  - [A, []]\n  - [B, [X]]\n";
        assert!(matches!(
            ScenarioDescription::from_yaml(unknown),
            Err(ScenarioError::UnknownNode { node, .. }) if node == "X"
        ));

        let no_root = "tree:\n  - [A, [B]]\n  - [B, [A]]\n";
        assert!(matches!(
            ScenarioDescription::from_yaml(no_root),
            Err(ScenarioError::InvalidDescription(_))
        ));

        let duplicate = "tree:\n  - [A, []]\n  - [A, []]\n";
        assert!(ScenarioDescription::from_yaml(duplicate).is_err());

        let bad_branch = "tree:\n  - [A, []]\nbranches:\n  head: [master, Z]\n";
        assert!(ScenarioDescription::from_yaml(bad_branch).is_err());

        assert!(matches!(
            ScenarioDescription::from_yaml("tree: 3"),
            Err(ScenarioError::Yaml(_))
        ));
    }
}
