//! In-memory view of commits, parents and ranges.

use tracing::debug;

use crate::graph::error::GraphResult;
use crate::storage::{CommitId, CommitInfo, GitRepository, VcsQuery};

/// An ordered set of commits unique to one ref relative to another,
/// oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRange {
    commits: Vec<CommitInfo>,
}

impl CommitRange {
    pub fn new(commits: Vec<CommitInfo>) -> Self {
        Self { commits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn commits(&self) -> &[CommitInfo] {
        &self.commits
    }

    pub fn ids(&self) -> Vec<CommitId> {
        self.commits.iter().map(|c| c.id).collect()
    }

    pub fn subjects(&self) -> Vec<&str> {
        self.commits.iter().map(CommitInfo::subject).collect()
    }

    pub fn contains(&self, id: CommitId) -> bool {
        self.commits.iter().any(|c| c.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommitInfo> {
        self.commits.iter()
    }

    pub fn into_vec(self) -> Vec<CommitInfo> {
        self.commits
    }
}

impl<'a> IntoIterator for &'a CommitRange {
    type Item = &'a CommitInfo;
    type IntoIter = std::slice::Iter<'a, CommitInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.commits.iter()
    }
}

/// Read-only access to the commit graph of a repository.
///
/// Never moves a ref.
#[derive(Clone)]
pub struct CommitGraph {
    repo: GitRepository,
}

impl CommitGraph {
    pub fn new(repo: GitRepository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Resolve any revspec git accepts.
    pub fn resolve(&self, rev: &str) -> GraphResult<CommitId> {
        Ok(self.repo.resolve(rev)?)
    }

    pub fn commit(&self, id: CommitId) -> GraphResult<CommitInfo> {
        Ok(self.repo.get_commit(id)?)
    }

    /// Parents of `id`; the mainline parent comes first.
    pub fn parents_of(&self, id: CommitId) -> GraphResult<Vec<CommitInfo>> {
        let commit = self.commit(id)?;
        commit.parent_ids.iter().map(|p| self.commit(*p)).collect()
    }

    /// Commits reachable from `to` but not from `from`, oldest first.
    pub fn load_range(&self, from: CommitId, to: CommitId) -> GraphResult<CommitRange> {
        self.load_range_excluding(to, &[from])
    }

    /// Commits reachable from `to` but from none of `excluded`, oldest first.
    pub fn load_range_excluding(&self, to: CommitId, excluded: &[CommitId]) -> GraphResult<CommitRange> {
        let commits = self.repo.history_oldest_first(to, excluded)?;
        debug!(to = %to, excluded = excluded.len(), count = commits.len(), "loaded range");
        Ok(CommitRange::new(commits))
    }

    /// The first-parent chain of `from`, newest first, stopping at anything
    /// reachable from `excluded`.
    pub fn first_parent_chain(&self, from: CommitId, excluded: &[CommitId]) -> GraphResult<Vec<CommitInfo>> {
        Ok(self.repo.first_parent_chain(from, excluded)?)
    }

    pub fn is_ancestor(&self, ancestor: CommitId, descendant: CommitId) -> GraphResult<bool> {
        Ok(self.repo.is_ancestor(ancestor, descendant)?)
    }

    pub fn merge_base(&self, a: CommitId, b: CommitId) -> GraphResult<Option<CommitId>> {
        Ok(self.repo.merge_base(a, b)?)
    }

    /// A human readable label: the symbolic name when one exists, else the
    /// short id.
    pub fn describe(&self, id: CommitId) -> String {
        match self.repo.resolve_symbolic_name(id) {
            Ok(Some(name)) => name,
            _ => id.short(),
        }
    }
}
