//! Building a repository from a [`ScenarioDescription`].

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use crate::graph::CommitGraph;
use crate::scenario::description::{ParentRef, ScenarioDescription, HEAD_ROLE};
use crate::scenario::error::{ScenarioError, ScenarioResult};
use crate::storage::{BranchName, CommitId, CommitInfo, GitRepository, GitSignature, TreeId};

const USER_NAME: &str = "Example User";
const USER_EMAIL: &str = "user@example.com";
const EPOCH: i64 = 1_500_000_000;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Visiting,
    Finished,
}

/// Order `tree` so that every node comes after its parents and after the
/// node it copies. Fails on cycles.
pub fn reverse_toposort(description: &ScenarioDescription) -> ScenarioResult<Vec<(String, Vec<String>)>> {
    let mut state: HashMap<&str, Visit> = HashMap::new();
    let mut ordered = Vec::with_capacity(description.tree.len());

    for (root, _) in &description.tree {
        if state.contains_key(root.as_str()) {
            continue;
        }
        let mut stack: Vec<&str> = vec![root.as_str()];
        while let Some(node) = stack.pop() {
            match state.get(node) {
                Some(Visit::Finished) => continue,
                Some(Visit::Visiting) => {
                    state.insert(node, Visit::Finished);
                    let parents = description.parents_of(node).unwrap_or_default();
                    ordered.push((node.to_string(), parents.to_vec()));
                    continue;
                }
                None => {}
            }

            state.insert(node, Visit::Visiting);
            stack.push(node);

            let parents = description.parents_of(node).ok_or_else(|| ScenarioError::UnknownNode {
                node: node.to_string(),
                referenced_by: "the tree".to_string(),
            })?;
            let copied = description.copied_node(node);
            let dependencies = parents
                .iter()
                .map(|p| ParentRef::parse(p).node)
                .chain(copied.as_deref());
            for dependency in dependencies {
                match state.get(dependency) {
                    None => {
                        // stored keys must borrow from the description
                        let key = description
                            .tree
                            .iter()
                            .find(|(name, _)| name == dependency)
                            .map(|(name, _)| name.as_str())
                            .ok_or_else(|| ScenarioError::UnknownNode {
                                node: dependency.to_string(),
                                referenced_by: node.to_string(),
                            })?;
                        stack.push(key);
                    }
                    Some(Visit::Visiting) => {
                        return Err(ScenarioError::Cycle {
                            node: node.to_string(),
                            dependency: dependency.to_string(),
                        })
                    }
                    Some(Visit::Finished) => {}
                }
            }
        }
    }
    Ok(ordered)
}

/// A repository built from a scenario, with its node -> commit map.
pub struct ScenarioRepo {
    dir: TempDir,
    repo: GitRepository,
    description: ScenarioDescription,
    nodes: BTreeMap<String, CommitId>,
    /// creation order, for diagnostics
    order: Vec<String>,
}

/// Build a throwaway repository holding the commits of `description`.
///
/// Every node adds a file of its own, so replays never conflict unless a
/// scenario asks for it. Only the listed branches exist afterwards and HEAD
/// is on the `head` branch when one is listed.
pub fn build_graph(description: &ScenarioDescription) -> ScenarioResult<ScenarioRepo> {
    description.validate()?;
    let dir = TempDir::new()?;
    let repo = GitRepository::init(dir.path())?.with_signature(GitSignature::new(USER_NAME, USER_EMAIL));
    repo.with_repo(|r| {
        let mut config = r.config()?;
        config.set_str("user.name", USER_NAME)?;
        config.set_str("user.email", USER_EMAIL)?;
        Ok(())
    })?;

    let builder = Builder {
        repo: &repo,
        description,
        clock: Cell::new(EPOCH),
    };
    let mut nodes = BTreeMap::new();
    let mut order = Vec::new();
    for (node, parents) in reverse_toposort(description)? {
        let id = builder.create(&node, &parents, &nodes)?;
        debug!(node = %node, commit = %id, "created scenario node");
        nodes.insert(node.clone(), id);
        order.push(node);
    }

    for (role, (name, node)) in &description.branches {
        let branch = BranchName::new(name.as_str()).map_err(|e| ScenarioError::invalid(format!("branch {}: {}", role, e)))?;
        repo.force_branch(&branch, nodes[node])?;
    }
    if let Ok((name, _)) = description.branch(HEAD_ROLE) {
        let branch = BranchName::new(name).map_err(|e| ScenarioError::invalid(e.to_string()))?;
        repo.checkout_branch(&branch)?;
    }

    Ok(ScenarioRepo {
        dir,
        repo,
        description: description.clone(),
        nodes,
        order,
    })
}

struct Builder<'a> {
    repo: &'a GitRepository,
    description: &'a ScenarioDescription,
    clock: Cell<i64>,
}

impl Builder<'_> {
    fn tick(&self) -> GitSignature {
        let now = self.clock.get() + 60;
        self.clock.set(now);
        GitSignature::new(USER_NAME, USER_EMAIL).at(now)
    }

    fn create(&self, node: &str, parents: &[String], built: &BTreeMap<String, CommitId>) -> ScenarioResult<CommitId> {
        let refs: Vec<ParentRef<'_>> = parents.iter().map(|p| ParentRef::parse(p)).collect();
        let ids: Vec<CommitId> = refs.iter().map(|p| built[p.node]).collect();

        if ids.len() > 1 {
            let tree = self.merge_tree(&refs, &ids)?;
            let message = format!(
                "Merging {} into {}",
                refs[1..].iter().map(|p| p.node).collect::<Vec<_>>().join(","),
                refs[0].node
            );
            return Ok(self.repo.commit_tree_as(tree, ids, &message, &self.tick())?);
        }

        // a copy repeats the change of the node it copies
        let mut source = node.to_string();
        while let Some(copied) = self.description.copied_node(&source) {
            source = copied;
        }
        let file = format!("{}.txt", source);
        let contents = format!("{}\n", source);
        let tree = self.repo.write_tree(ids.first().copied(), &[(file.as_str(), contents.as_bytes())])?;
        let message = format!("Add {}", source);
        Ok(self.repo.commit_tree_as(tree, ids, &message, &self.tick())?)
    }

    fn merge_tree(&self, refs: &[ParentRef<'_>], ids: &[CommitId]) -> ScenarioResult<TreeId> {
        let kept: Vec<CommitId> = refs
            .iter()
            .zip(ids)
            .filter(|(p, _)| p.keep_tree)
            .map(|(_, id)| *id)
            .collect();
        let tree = match kept.as_slice() {
            [] => self.repo.union_tree(ids)?,
            [only] => self.repo.tree_at(*only)?.tree_id,
            many => self.repo.union_tree(many)?,
        };
        Ok(tree)
    }
}

impl ScenarioRepo {
    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn description(&self) -> &ScenarioDescription {
        &self.description
    }

    pub fn graph(&self) -> CommitGraph {
        CommitGraph::new(self.repo.clone())
    }

    /// The commit created for `node`.
    pub fn node(&self, node: &str) -> ScenarioResult<CommitId> {
        self.nodes.get(node).copied().ok_or_else(|| ScenarioError::UnknownNode {
            node: node.to_string(),
            referenced_by: "the caller".to_string(),
        })
    }

    pub fn nodes(&self) -> &BTreeMap<String, CommitId> {
        &self.nodes
    }

    /// The commits for `nodes`, in the given order.
    pub fn commits_for(&self, nodes: &[String]) -> ScenarioResult<Vec<(String, CommitInfo)>> {
        nodes
            .iter()
            .map(|node| Ok((node.clone(), self.repo.get_commit(self.node(node)?)?)))
            .collect()
    }

    /// Branch and current tip for `role`.
    pub fn branch(&self, role: &str) -> ScenarioResult<(BranchName, CommitId)> {
        let (name, _) = self.description.branch(role)?;
        let branch = BranchName::new(name).map_err(|e| ScenarioError::invalid(e.to_string()))?;
        let tip = self.repo.resolve_branch(&branch)?;
        Ok((branch, tip))
    }

    /// Node -> commit map and a graph log of every branch, for failure
    /// output.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if !self.description.description.is_empty() {
            let _ = writeln!(out, "scenario: {}", self.description.description.trim());
        }
        let _ = writeln!(out, "nodes:");
        for node in &self.order {
            let id = self.nodes[node];
            let subject = self
                .repo
                .get_commit(id)
                .map(|c| c.subject().to_string())
                .unwrap_or_default();
            let _ = writeln!(out, "  {:<6} {} {}", node, id.short(), subject);
        }

        let _ = writeln!(out, "log:");
        match self.log() {
            Ok(lines) => {
                for line in lines {
                    let _ = writeln!(out, "  {}", line);
                }
            }
            Err(e) => {
                let _ = writeln!(out, "  <unavailable: {}>", e);
            }
        }
        out
    }

    /// `git log --graph --oneline --decorate --all`, without the lanes.
    fn log(&self) -> ScenarioResult<Vec<String>> {
        let branches = self.repo.list_branches()?;
        let mut labels: BTreeMap<CommitId, Vec<String>> = BTreeMap::new();
        let mut tips = Vec::new();
        for branch in &branches {
            let tip = self.repo.resolve_branch(branch)?;
            labels.entry(tip).or_default().push(branch.to_string());
            tips.push(tip);
        }
        let head = self.repo.current_branch()?;

        let mut seen = std::collections::HashSet::new();
        let mut commits = Vec::new();
        for tip in tips {
            for commit in self.repo.history(tip, &[])? {
                if seen.insert(commit.id) {
                    commits.push(commit);
                }
            }
        }
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        Ok(commits
            .iter()
            .map(|commit| {
                let marker = if commit.is_merge() { "*-." } else { "*" };
                let decoration = match labels.get(&commit.id) {
                    Some(names) => {
                        let names: Vec<String> = names
                            .iter()
                            .map(|n| match &head {
                                Some(h) if h.as_str() == n => format!("HEAD -> {}", n),
                                _ => n.clone(),
                            })
                            .collect();
                        format!(" ({})", names.join(", "))
                    }
                    None => String::new(),
                };
                let parents: Vec<String> = commit.parent_ids.iter().map(|p| p.short()).collect();
                format!(
                    "{} {}{} {} [{}]",
                    marker,
                    commit.id.short(),
                    decoration,
                    commit.subject(),
                    parents.join(" ")
                )
            })
            .collect())
    }
}
