//! Fixtures shared by the unit tests.

use std::cell::Cell;

use tempfile::TempDir;

use crate::storage::{BranchName, CommitId, GitRepository, GitSignature};

/// A throwaway repository with a deterministic clock.
pub(crate) struct TestRepo {
    pub dir: TempDir,
    pub repo: GitRepository,
    clock: Cell<i64>,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path())
            .unwrap()
            .with_signature(GitSignature::new("Test", "test@example.com"));
        Self {
            dir,
            repo,
            clock: Cell::new(1_600_000_000),
        }
    }

    fn tick(&self) -> GitSignature {
        let now = self.clock.get() + 60;
        self.clock.set(now);
        GitSignature::new("Test", "test@example.com").at(now)
    }

    /// A commit with subject `subject` that adds `<subject>.txt`; merges
    /// combine the files of all parents.
    pub fn commit(&self, subject: &str, parents: &[CommitId]) -> CommitId {
        let file = format!("{}.txt", subject.to_lowercase());
        self.commit_file(subject, parents, &file, &format!("{}\n", subject))
    }

    /// A commit writing `contents` to `path` on top of its parents.
    pub fn commit_file(&self, subject: &str, parents: &[CommitId], path: &str, contents: &str) -> CommitId {
        let base = match parents.len() {
            0 => None,
            1 => Some(parents[0]),
            _ => {
                let tree = self.repo.union_tree(parents).unwrap();
                let merge = self
                    .repo
                    .commit_tree_as(tree, parents.to_vec(), subject, &self.tick())
                    .unwrap();
                return merge;
            }
        };
        let tree = self.repo.write_tree(base, &[(path, contents.as_bytes())]).unwrap();
        self.repo
            .commit_tree_as(tree, parents.to_vec(), subject, &self.tick())
            .unwrap()
    }

    /// A merge taking the tree of `parents[tree_from]`.
    pub fn merge_taking(&self, subject: &str, parents: &[CommitId], tree_from: usize) -> CommitId {
        let tree = self.repo.tree_at(parents[tree_from]).unwrap().tree_id;
        self.repo
            .commit_tree_as(tree, parents.to_vec(), subject, &self.tick())
            .unwrap()
    }

    /// Create or move a branch.
    pub fn branch(&self, name: &str, at: CommitId) -> BranchName {
        let branch = BranchName::new(name).unwrap();
        self.repo.force_branch(&branch, at).unwrap();
        branch
    }

    pub fn checkout(&self, name: &str) {
        self.repo.checkout_branch(&BranchName::new(name).unwrap()).unwrap();
    }

    pub fn tip(&self, name: &str) -> CommitId {
        self.repo.resolve_branch(&BranchName::new(name).unwrap()).unwrap()
    }

    /// Subjects of the commits on `name` not on `base`, oldest first.
    pub fn subjects_between(&self, base: CommitId, name: &str) -> Vec<String> {
        self.repo
            .history_oldest_first(self.tip(name), &[base])
            .unwrap()
            .iter()
            .map(|c| c.subject().to_string())
            .collect()
    }
}
