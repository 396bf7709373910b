//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer.  It wraps `git2::Repository`
//!   with thread-safe access and provides the high-level operations that the
//!  graph model, the replay engine and the scenario builder use.
//!
//! All other storage modules use this for Git access.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::CheckoutBuilder;
use git2::{Index, Repository, ResetType, Status, StatusOptions};
use parking_lot::RwLock;
use tracing::debug;

use crate::storage::commit::{self, CommitBuilder, CommitInfo, HistoryIterator};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::query::{self, RefPattern, VcsQuery};
use crate::storage::refs::RefManager;
use crate::storage::tree::TreeMutator;
use crate::storage::types::{BranchName, CommitId, GitSignature, TreeId};

/// The main Git repository wrapper.
///
/// This provides thread-safe access to all Git operations.
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: RwLock<Repository>,
    path: PathBuf,
    signature: GitSignature,
}

/// A snapshot of a tree at a commit
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub tree_id: TreeId,
    pub files: Vec<String>,
}

/// Result of applying one commit's change to the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CherryPickResult {
    /// applied cleanly; the index holds this tree
    Clean(TreeId),
    /// conflict markers were left in these paths
    Conflicted(Vec<PathBuf>),
}

impl GitRepository {
    /// Find the repository containing `path`, walking up the directory tree.
    pub fn discover(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::discover(path).map_err(|_| StorageError::NotARepository(path.to_path_buf()))?;
        debug!(path = %path.display(), git_dir = %repo.path().display(), "discovered repository");
        Ok(Self::from_git2(repo))
    }

    /// Discover the repository at `GIT_WORK_TREE`, or the current directory.
    pub fn from_env() -> StorageResult<Self> {
        let path = match env::var_os("GIT_WORK_TREE") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => env::current_dir()?,
        };
        Self::discover(path)
    }

    /// Wrap an already opened handle; no discovery is performed.
    pub fn from_git2(repo: Repository) -> Self {
        let path = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();
        let signature = GitSignature::from_config(&repo);

        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: RwLock::new(repo),
                path,
                signature,
            }),
        }
    }

    /// Initialize a new, empty repository.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let repo = Repository::init(path.as_ref())?;
        Ok(Self::from_git2(repo))
    }

    /// Get the repository path (the working tree root when there is one).
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The `.git` directory.
    pub fn git_dir(&self) -> PathBuf {
        self.inner.repo.read().path().to_path_buf()
    }

    /// The working tree root; bare repositories have none.
    pub fn workdir(&self) -> StorageResult<PathBuf> {
        let repo = self.inner.repo.read();
        repo.workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::BareRepository(repo.path().to_path_buf()))
    }

    /// The committer identity used for new commits.
    pub fn signature(&self) -> &GitSignature {
        &self.inner.signature
    }

    /// Set the signature for commits.
    pub fn with_signature(self, signature: GitSignature) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Self {
                inner: Arc::new(GitRepositoryInner { signature, ..inner }),
            },
            // shared: reopen the same repository under a second handle
            Err(shared) => {
                let repo = Repository::open(shared.repo.read().path());
                match repo {
                    Ok(repo) => Self {
                        inner: Arc::new(GitRepositoryInner {
                            repo: RwLock::new(repo),
                            path: shared.path.clone(),
                            signature,
                        }),
                    },
                    Err(_) => Self { inner: shared },
                }
            }
        }
    }

    /// Execute a function with read access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.read();
        f(&repo)
    }

    /// Execute a function with write access to the repository.
    pub fn with_repo_mut<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.write();
        f(&repo)
    }

    // ==================== Commits & History ====================

    /// Get the commit HEAD points to.
    pub fn head(&self) -> StorageResult<CommitId> {
        self.with_repo(RefManager::head_commit)
    }

    /// The branch HEAD is attached to, or None when detached.
    pub fn current_branch(&self) -> StorageResult<Option<BranchName>> {
        self.with_repo(RefManager::current_branch)
    }

    /// Resolve any revision git understands to a commit.
    pub fn resolve(&self, spec: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| commit::resolve_revision(repo, spec))
    }

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| commit::get_commit(repo, id))
    }

    /// Get the tree at a specific commit.
    pub fn tree_at(&self, commit_id: CommitId) -> StorageResult<TreeSnapshot> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, commit_id)?;
            Ok(TreeSnapshot {
                tree_id: tree.id(),
                files: tree.list_files(),
            })
        })
    }

    /// Read one file from the tree of a commit.
    pub fn read_file(&self, commit_id: CommitId, path: &str) -> StorageResult<Option<Vec<u8>>> {
        self.with_repo(|repo| {
            let tree = commit::get_tree_at_commit(repo, commit_id)?;
            tree.read_file(repo, path)
        })
    }

    /// Commits reachable from `start` but from none of `hide`, newest first.
    pub fn history(&self, start: CommitId, hide: &[CommitId]) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let mut walk = HistoryIterator::new(repo, start)?;
            for boundary in hide {
                walk = walk.hide(*boundary)?;
            }
            walk.collect()
        })
    }

    /// Same as [`GitRepository::history`], oldest first.
    pub fn history_oldest_first(&self, start: CommitId, hide: &[CommitId]) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let mut walk = HistoryIterator::new(repo, start)?.oldest_first()?;
            for boundary in hide {
                walk = walk.hide(*boundary)?;
            }
            walk.collect()
        })
    }

    /// The first-parent chain from `start`, newest first.
    pub fn first_parent_chain(&self, start: CommitId, hide: &[CommitId]) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let mut walk = HistoryIterator::new(repo, start)?.first_parent_only()?;
            for boundary in hide {
                walk = walk.hide(*boundary)?;
            }
            walk.collect()
        })
    }

    /// Whether `ancestor` is reachable from `descendant` (equal counts).
    pub fn is_ancestor(&self, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
        self.with_repo(|repo| commit::is_ancestor(repo, ancestor, descendant))
    }

    /// The best common ancestor of two commits, if they share history.
    pub fn merge_base(&self, a: CommitId, b: CommitId) -> StorageResult<Option<CommitId>> {
        self.with_repo(|repo| commit::find_merge_base(repo, a, b))
    }

    /// The patch id of a non-merge commit, as a hex string.
    pub fn patch_id(&self, id: CommitId) -> StorageResult<Option<String>> {
        self.with_repo(|repo| Ok(commit::patch_id(repo, id)?.map(|oid| oid.to_string())))
    }

    /// Create a commit from an existing tree, authored and committed by
    /// this repository's signature. No ref is moved.
    pub fn commit_tree(&self, tree: TreeId, parents: Vec<CommitId>, message: &str) -> StorageResult<CommitId> {
        self.commit_tree_as(tree, parents, message, &self.inner.signature)
    }

    /// Like [`GitRepository::commit_tree`] with an explicit signature.
    pub fn commit_tree_as(
        &self,
        tree: TreeId,
        parents: Vec<CommitId>,
        message: &str,
        signature: &GitSignature,
    ) -> StorageResult<CommitId> {
        self.with_repo_mut(|repo| {
            CommitBuilder::new(repo)
                .tree(tree)
                .parents(parents)
                .message(message)
                .signature(signature.clone())
                .commit()
        })
    }

    /// Recreate `original` on top of `parent` with the given tree and
    /// message, keeping its author. No ref is moved.
    pub fn replay_commit(
        &self,
        original: CommitId,
        tree: TreeId,
        parent: CommitId,
        message: &str,
    ) -> StorageResult<CommitId> {
        self.with_repo_mut(|repo| {
            CommitBuilder::new(repo)
                .tree(tree)
                .parent(parent)
                .message(message)
                .signature(self.inner.signature.clone())
                .author_from(original)?
                .commit()
        })
    }

    /// Write a tree: the tree of `base` (or an empty one) with `files`
    /// inserted or replaced.
    pub fn write_tree(&self, base: Option<CommitId>, files: &[(&str, &[u8])]) -> StorageResult<TreeId> {
        self.with_repo_mut(|repo| {
            let mut mutator = match base {
                Some(commit_id) => {
                    let tree = commit::get_tree_at_commit(repo, commit_id)?;
                    TreeMutator::from_tree(repo, &tree)?
                }
                None => TreeMutator::empty(repo)?,
            };
            for (path, contents) in files {
                mutator.upsert_file(path, contents)?;
            }
            mutator.write()
        })
    }

    /// A tree holding the top-level files of every commit in `sources`;
    /// later sources win on name clashes.
    pub fn union_tree(&self, sources: &[CommitId]) -> StorageResult<TreeId> {
        self.with_repo_mut(|repo| {
            let mut mutator = TreeMutator::empty(repo)?;
            for source in sources {
                let tree = commit::get_tree_at_commit(repo, *source)?;
                for name in tree.list_files() {
                    if let Some(contents) = tree.read_file(repo, &name)? {
                        mutator.upsert_file(&name, &contents)?;
                    }
                }
            }
            mutator.write()
        })
    }

    // ==================== Branch Operations ====================

    /// Get the commit ID for a branch.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_branch(repo, branch))
    }

    /// Check if a branch exists.
    pub fn branch_exists(&self, branch: &BranchName) -> StorageResult<bool> {
        self.with_repo(|repo| Ok(RefManager::branch_exists(repo, branch)))
    }

    /// Create a new branch; fails if it exists.
    pub fn create_branch(&self, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::create_branch(repo, branch, target))
    }

    /// Create or move a branch unconditionally.
    pub fn force_branch(&self, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::force_branch(repo, branch, target))
    }

    /// Move an existing branch.
    pub fn update_branch(&self, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::update_branch(repo, branch, target))
    }

    /// Move a branch only if it still points at `expected`.
    pub fn update_branch_if_unchanged(
        &self,
        branch: &BranchName,
        expected: CommitId,
        target: CommitId,
    ) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::update_branch_if_unchanged(repo, branch, expected, target))
    }

    /// Delete a branch.
    pub fn delete_branch(&self, branch: &BranchName) -> StorageResult<()> {
        self.with_repo_mut(|repo| RefManager::delete_branch(repo, branch))
    }

    /// List all local branches.
    pub fn list_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(|repo| RefManager::list_branches(repo, None))
    }

    /// List branches created by previous imports.
    pub fn list_import_branches(&self) -> StorageResult<Vec<BranchName>> {
        self.with_repo(RefManager::list_import_branches)
    }

    // ==================== Working Tree ====================

    /// Attach HEAD to `branch` and force the working tree to match it.
    /// Refuses with [`StorageError::UntrackedWouldBeOverwritten`] when an
    /// untracked file sits where the branch tracks one.
    pub fn checkout_branch(&self, branch: &BranchName) -> StorageResult<()> {
        let target = self.resolve_branch(branch)?;
        let paths = self.untracked_collisions(target)?;
        if !paths.is_empty() {
            return Err(StorageError::UntrackedWouldBeOverwritten { paths });
        }
        self.with_repo_mut(|repo| {
            RefManager::set_head(repo, branch)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.checkout_head(Some(&mut checkout))?;
            debug!(branch = %branch, "checked out");
            Ok(())
        })
    }

    /// Tracked paths with uncommitted changes (staged, unstaged or
    /// conflicted). Untracked and ignored files do not count.
    pub fn dirty_paths(&self) -> StorageResult<Vec<PathBuf>> {
        self.with_repo(|repo| {
            if repo.is_bare() {
                return Err(StorageError::BareRepository(repo.path().to_path_buf()));
            }
            let mut options = StatusOptions::new();
            options.include_untracked(false).include_ignored(false);
            let statuses = repo.statuses(Some(&mut options))?;

            let mut paths: Vec<PathBuf> = statuses
                .iter()
                .filter(|entry| !entry.status().is_empty())
                .filter_map(|entry| entry.path().map(PathBuf::from))
                .collect();
            paths.sort();
            paths.dedup();
            Ok(paths)
        })
    }

    /// Untracked files whose paths are tracked in the tree of `commit_id`.
    pub fn untracked_collisions(&self, commit_id: CommitId) -> StorageResult<Vec<PathBuf>> {
        self.with_repo(|repo| {
            if repo.is_bare() {
                return Err(StorageError::BareRepository(repo.path().to_path_buf()));
            }
            let mut options = StatusOptions::new();
            options
                .include_untracked(true)
                .recurse_untracked_dirs(true)
                .include_ignored(false);
            let statuses = repo.statuses(Some(&mut options))?;
            let tree = commit::get_tree_at_commit(repo, commit_id)?;

            let mut paths: Vec<PathBuf> = statuses
                .iter()
                .filter(|entry| entry.status().contains(Status::WT_NEW))
                .filter_map(|entry| entry.path().map(PathBuf::from))
                .filter(|path| tree.inner().get_path(path).is_ok())
                .collect();
            paths.sort();
            Ok(paths)
        })
    }

    /// Fail with [`StorageError::DirtyWorktree`] unless the worktree is clean.
    pub fn ensure_clean(&self) -> StorageResult<()> {
        let paths = self.dirty_paths()?;
        if paths.is_empty() {
            Ok(())
        } else {
            Err(StorageError::DirtyWorktree { paths })
        }
    }

    /// Apply the change introduced by `commit` to the index and working
    /// tree on top of HEAD. HEAD itself does not move.
    pub fn cherry_pick(&self, commit_id: CommitId) -> StorageResult<CherryPickResult> {
        self.with_repo_mut(|repo| {
            let commit = repo
                .find_commit(commit_id.raw())
                .map_err(|_| StorageError::CommitNotFound(commit_id.to_string()))?;
            repo.cherrypick(&commit, None)?;

            let mut index = repo.index()?;
            if index.has_conflicts() {
                let paths = conflict_paths(&index)?;
                debug!(commit = %commit_id, conflicts = paths.len(), "cherry-pick conflicted");
                return Ok(CherryPickResult::Conflicted(paths));
            }
            let tree = index.write_tree()?;
            Ok(CherryPickResult::Clean(TreeId::new(tree)))
        })
    }

    /// Paths still conflicted in the on-disk index.
    pub fn index_conflicts(&self) -> StorageResult<Vec<PathBuf>> {
        self.with_repo(|repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            if !index.has_conflicts() {
                return Ok(Vec::new());
            }
            conflict_paths(&index)
        })
    }

    /// Write the on-disk index as a tree.
    pub fn write_index_tree(&self) -> StorageResult<TreeId> {
        self.with_repo_mut(|repo| {
            let mut index = repo.index()?;
            index.read(false)?;
            Ok(TreeId::new(index.write_tree()?))
        })
    }

    /// Clear any in-progress operation state (CHERRY_PICK_HEAD and friends).
    pub fn cleanup_state(&self) -> StorageResult<()> {
        self.with_repo_mut(|repo| Ok(repo.cleanup_state()?))
    }

    /// Attach HEAD to `branch`, move it to `commit`, and reset the index
    /// and working tree to match.
    pub fn reset_branch_hard(&self, branch: &BranchName, commit_id: CommitId) -> StorageResult<()> {
        self.with_repo_mut(|repo| {
            RefManager::set_head(repo, branch)?;
            let object = repo.find_object(commit_id.raw(), None)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.reset(&object, ResetType::Hard, Some(&mut checkout))?;
            repo.cleanup_state()?;
            Ok(())
        })
    }

    // ==================== Config ====================

    /// A string value from the repository's git configuration.
    pub fn config_string(&self, key: &str) -> StorageResult<Option<String>> {
        self.with_repo(|repo| {
            let config = repo.config()?;
            match config.get_string(key) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
                Err(e) => Err(StorageError::Git(e)),
            }
        })
    }
}

impl VcsQuery for GitRepository {
    fn resolve_symbolic_name(&self, id: CommitId) -> StorageResult<Option<String>> {
        self.with_repo(|repo| query::symbolic_name(repo, id, None))
    }

    fn resolve_symbolic_name_matching(&self, id: CommitId, pattern: &str) -> StorageResult<Option<String>> {
        let pattern = RefPattern::new(pattern)?;
        self.with_repo(|repo| query::symbolic_name(repo, id, Some(&pattern)))
    }

    fn is_detached_head(&self) -> StorageResult<bool> {
        self.with_repo(RefManager::is_detached)
    }

    fn tool_version(&self) -> Option<String> {
        query::installed_git_version()
    }
}

fn conflict_paths(index: &Index) -> StorageResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
        if let Some(entry) = entry {
            paths.push(PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path())
            .unwrap()
            .with_signature(GitSignature::new("Test", "test@example.com"));
        (dir, repo)
    }

    fn commit_on(repo: &GitRepository, parent: Option<CommitId>, file: &str, contents: &str) -> CommitId {
        let tree = repo.write_tree(parent, &[(file, contents.as_bytes())]).unwrap();
        let parents = parent.into_iter().collect();
        repo.commit_tree(tree, parents, &format!("Change {}", file)).unwrap()
    }

    fn master() -> BranchName {
        BranchName::new("master").unwrap()
    }

    #[test]
    fn test_discover_fails_outside_repository() {
        let dir = TempDir::new().unwrap();
        let result = GitRepository::discover(dir.path());
        assert!(matches!(result, Err(StorageError::NotARepository(_))));
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let (dir, _repo) = setup();
        let nested = dir.path().join("src");
        std::fs::create_dir_all(&nested).unwrap();
        let found = GitRepository::discover(&nested).unwrap();
        assert_eq!(
            found.workdir().unwrap().canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_commit_and_history() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        let b = commit_on(&repo, Some(a), "b.txt", "b");
        let c = commit_on(&repo, Some(b), "c.txt", "c");

        let newest: Vec<CommitId> = repo.history(c, &[]).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(newest, vec![c, b, a]);

        let oldest: Vec<CommitId> = repo
            .history_oldest_first(c, &[a])
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(oldest, vec![b, c]);

        let snapshot = repo.tree_at(c).unwrap();
        assert_eq!(snapshot.files, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(repo.read_file(c, "b.txt").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_union_tree() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        let b = commit_on(&repo, None, "b.txt", "b");
        let tree = repo.union_tree(&[a, b]).unwrap();
        let merge = repo.commit_tree(tree, vec![a, b], "Merge").unwrap();
        assert_eq!(repo.tree_at(merge).unwrap().files, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_checkout_and_dirty_paths() {
        let (dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        repo.create_branch(&master(), a).unwrap();
        repo.checkout_branch(&master()).unwrap();

        assert_eq!(repo.current_branch().unwrap(), Some(master()));
        assert!(repo.dirty_paths().unwrap().is_empty());
        repo.ensure_clean().unwrap();

        std::fs::write(dir.path().join("a.txt"), "changed").unwrap();
        std::fs::write(dir.path().join("untracked.txt"), "new").unwrap();
        assert_eq!(repo.dirty_paths().unwrap(), vec![PathBuf::from("a.txt")]);
        assert!(matches!(repo.ensure_clean(), Err(StorageError::DirtyWorktree { .. })));
    }

    #[test]
    fn test_checkout_refuses_to_overwrite_untracked() {
        let (dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        let b = commit_on(&repo, Some(a), "b.txt", "b");
        repo.create_branch(&master(), a).unwrap();
        repo.checkout_branch(&master()).unwrap();
        let next = BranchName::new("next").unwrap();
        repo.create_branch(&next, b).unwrap();

        std::fs::write(dir.path().join("b.txt"), "my notes").unwrap();
        std::fs::write(dir.path().join("other.txt"), "scratch").unwrap();
        assert_eq!(repo.untracked_collisions(b).unwrap(), vec![PathBuf::from("b.txt")]);
        assert!(repo.untracked_collisions(a).unwrap().is_empty());

        match repo.checkout_branch(&next) {
            Err(StorageError::UntrackedWouldBeOverwritten { paths }) => {
                assert_eq!(paths, vec![PathBuf::from("b.txt")]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(repo.current_branch().unwrap(), Some(master()));
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "my notes");

        std::fs::remove_file(dir.path().join("b.txt")).unwrap();
        repo.checkout_branch(&next).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("other.txt")).unwrap(), "scratch");
    }

    #[test]
    fn test_cherry_pick_clean() {
        let (_dir, repo) = setup();
        let base = commit_on(&repo, None, "base.txt", "base");
        let side = commit_on(&repo, Some(base), "side.txt", "side");
        let main = commit_on(&repo, Some(base), "main.txt", "main");
        repo.create_branch(&master(), main).unwrap();
        repo.checkout_branch(&master()).unwrap();

        let tree = match repo.cherry_pick(side).unwrap() {
            CherryPickResult::Clean(tree) => tree,
            other => panic!("unexpected {:?}", other),
        };
        let replayed = repo.replay_commit(side, tree, main, "Change side.txt").unwrap();
        repo.cleanup_state().unwrap();

        let info = repo.get_commit(replayed).unwrap();
        assert_eq!(info.parent_ids, vec![main]);
        assert_eq!(repo.tree_at(replayed).unwrap().files, vec!["base.txt", "main.txt", "side.txt"]);
        // HEAD did not move
        assert_eq!(repo.head().unwrap(), main);
    }

    #[test]
    fn test_cherry_pick_conflict_and_reset() {
        let (dir, repo) = setup();
        let base = commit_on(&repo, None, "shared.txt", "base\n");
        let theirs = commit_on(&repo, Some(base), "shared.txt", "theirs\n");
        let ours = commit_on(&repo, Some(base), "shared.txt", "ours\n");
        repo.create_branch(&master(), ours).unwrap();
        repo.checkout_branch(&master()).unwrap();

        let result = repo.cherry_pick(theirs).unwrap();
        assert_eq!(result, CherryPickResult::Conflicted(vec![PathBuf::from("shared.txt")]));
        assert_eq!(repo.index_conflicts().unwrap(), vec![PathBuf::from("shared.txt")]);
        let on_disk = std::fs::read_to_string(dir.path().join("shared.txt")).unwrap();
        assert!(on_disk.contains("<<<<<<<"));

        repo.reset_branch_hard(&master(), ours).unwrap();
        assert!(repo.index_conflicts().unwrap().is_empty());
        assert!(repo.dirty_paths().unwrap().is_empty());
        let restored = std::fs::read_to_string(dir.path().join("shared.txt")).unwrap();
        assert_eq!(restored, "ours\n");
    }

    #[test]
    fn test_detached_head_query() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        repo.create_branch(&master(), a).unwrap();
        repo.checkout_branch(&master()).unwrap();
        assert!(!repo.is_detached_head().unwrap());

        repo.with_repo_mut(|r| Ok(r.set_head_detached(a.raw())?)).unwrap();
        assert!(repo.is_detached_head().unwrap());
        assert_eq!(repo.current_branch().unwrap(), None);
    }

    #[test]
    fn test_symbolic_names() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        let b = commit_on(&repo, Some(a), "b.txt", "b");
        let c = commit_on(&repo, Some(b), "c.txt", "c");
        repo.create_branch(&master(), c).unwrap();

        assert_eq!(repo.resolve_symbolic_name(c).unwrap().as_deref(), Some("master"));
        assert_eq!(repo.resolve_symbolic_name(a).unwrap().as_deref(), Some("master~2"));

        // a tag at the same distance wins over the branch
        repo.with_repo_mut(|r| {
            let object = r.find_object(b.raw(), None)?;
            r.tag_lightweight("v1", &object, false)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(repo.resolve_symbolic_name(b).unwrap().as_deref(), Some("tags/v1"));
        assert_eq!(repo.resolve_symbolic_name(a).unwrap().as_deref(), Some("tags/v1~1"));

        assert_eq!(
            repo.resolve_symbolic_name_matching(a, "refs/heads/*").unwrap().as_deref(),
            Some("master~2")
        );
        assert_eq!(repo.resolve_symbolic_name_matching(a, "refs/heads/nope/*").unwrap(), None);
    }

    #[test]
    fn test_symbolic_name_through_merge() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        let side = commit_on(&repo, Some(a), "side.txt", "side");
        let main = commit_on(&repo, Some(a), "main.txt", "main");
        let tree = repo.union_tree(&[main, side]).unwrap();
        let merge = repo.commit_tree(tree, vec![main, side], "Merge side").unwrap();
        repo.create_branch(&master(), merge).unwrap();

        assert_eq!(repo.resolve_symbolic_name(side).unwrap().as_deref(), Some("master^2"));
        assert_eq!(repo.resolve_symbolic_name(main).unwrap().as_deref(), Some("master~1"));
        assert_eq!(repo.resolve_symbolic_name(a).unwrap().as_deref(), Some("master~2"));
    }

    #[test]
    fn test_unreachable_and_unknown_commits() {
        let (_dir, repo) = setup();
        let a = commit_on(&repo, None, "a.txt", "a");
        repo.create_branch(&master(), a).unwrap();
        let dangling = commit_on(&repo, Some(a), "b.txt", "b");

        assert!(repo.is_reachable(a).unwrap());
        assert!(!repo.is_reachable(dangling).unwrap());

        let unknown = CommitId::from_hex("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        assert_eq!(repo.resolve_symbolic_name(unknown).unwrap(), None);
    }

    #[test]
    fn test_config_string() {
        let (_dir, repo) = setup();
        assert_eq!(repo.config_string("sequence.editor").unwrap(), None);
        repo.with_repo_mut(|r| Ok(r.config()?.set_str("sequence.editor", "cat")?))
            .unwrap();
        assert_eq!(repo.config_string("sequence.editor").unwrap().as_deref(), Some("cat"));
    }
}
