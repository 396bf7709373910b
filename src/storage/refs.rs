//!  Branch and reference management.
//!
//!  Git refs are pointers to commits. This module handles:
//! - resolving and moving branches
//! - import branch lifecycle (create, reuse, delete)
//! - HEAD inspection (current branch, detached state)
//! - enumerating refs as naming candidates
//!
//! Import branches use a namespaced pattern: `import/{upstream}-{short id}`

use git2::{BranchType, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// A ref that can name commits, with its display name (`master`,
/// `tags/v1.0`, `remotes/origin/master`) and the commit it peels to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRef {
    pub full_name: String,
    pub display_name: String,
    pub target: CommitId,
    pub is_tag: bool,
}

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(CommitId::new(commit.id()))
    }

    /// Get the commit HEAD points to.
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| {
            if e.code() == git2::ErrorCode::UnbornBranch {
                StorageError::RefNotFound("HEAD".to_string())
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// The branch HEAD is attached to, or None when detached.
    pub fn current_branch(repo: &Repository) -> StorageResult<Option<BranchName>> {
        if repo.head_detached()? {
            return Ok(None);
        }
        let head = repo.find_reference("HEAD")?;
        match head.symbolic_target() {
            Some(target) => Ok(BranchName::new(target).ok()),
            None => Ok(None),
        }
    }

    /// Check if HEAD is detached from any branch.
    pub fn is_detached(repo: &Repository) -> StorageResult<bool> {
        match repo.head_detached() {
            Ok(detached) => Ok(detached),
            // an unborn HEAD still names a branch
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(false),
            Err(e) => Err(StorageError::Git(e)),
        }
    }

    /// Point HEAD at a branch (without touching the working tree).
    pub fn set_head(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        repo.set_head(&branch.as_ref_path())?;
        Ok(())
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        if Self::branch_exists(repo, branch) {
            return Err(StorageError::BranchAlreadyExists(branch.to_string()));
        }

        let commit = repo.find_commit(target.raw())?;
        repo.branch(branch.as_str(), &commit, false)?;

        Ok(())
    }

    /// Create a branch, or move it if it already exists.
    pub fn force_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        let commit = repo.find_commit(target.raw())?;
        repo.branch(branch.as_str(), &commit, true)?;
        Ok(())
    }

    /// Update a branch to point to a new commit.
    ///
    /// This is a force update - use `update_branch_if_unchanged` for safe updates.
    pub fn update_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        reference.set_target(target.raw(), &format!("git-upstream: move to {}", target.short()))?;

        Ok(())
    }

    /// Update a branch only if it still points to the expected commit.
    ///
    /// This provides compare-and-swap semantics; errors if the branch was
    /// moved by someone else.
    pub fn update_branch_if_unchanged(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
    ) -> StorageResult<()> {
        let current = Self::resolve_branch(repo, branch)?;

        if current != expected {
            return Err(StorageError::ConcurrentModification {
                branch: branch.to_string(),
            });
        }

        Self::update_branch(repo, branch, new_target)
    }

    /// Delete a branch.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        let mut git_branch = repo
            .find_branch(branch.as_str(), BranchType::Local)
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        git_branch.delete()?;

        Ok(())
    }

    /// List all local branches with an optional prefix filter.
    pub fn list_branches(repo: &Repository, prefix: Option<&str>) -> StorageResult<Vec<BranchName>> {
        let branches = repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch_result in branches {
            let (branch, _) = branch_result?;
            if let Some(name) = branch.name()? {
                let matches = match prefix {
                    Some(p) => name.starts_with(p),
                    None => true,
                };
                if matches {
                    if let Ok(branch_name) = BranchName::new(name) {
                        result.push(branch_name);
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// List all branches created by the import command.
    pub fn list_import_branches(repo: &Repository) -> StorageResult<Vec<BranchName>> {
        Self::list_branches(repo, Some(BranchName::IMPORT_PREFIX))
    }

    /// All tags, local branches and remote-tracking branches that peel to a
    /// commit, sorted by full name.
    pub fn named_refs(repo: &Repository) -> StorageResult<Vec<NamedRef>> {
        let mut result = Vec::new();

        for reference in repo.references()? {
            let reference = reference?;
            let full_name = match reference.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            let display_name = match shorten_ref_name(&full_name) {
                Some(name) => name,
                None => continue,
            };
            // tags pointing at trees or blobs cannot name commits
            let target = match reference.peel_to_commit() {
                Ok(commit) => CommitId::new(commit.id()),
                Err(_) => continue,
            };
            result.push(NamedRef {
                is_tag: full_name.starts_with("refs/tags/"),
                full_name,
                display_name,
                target,
            });
        }

        result.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(result)
    }
}

/// Shorten a full ref name to its display form; None for refs that never
/// name commits (notes, stash, symbolic HEADs).
fn shorten_ref_name(full: &str) -> Option<String> {
    if let Some(s) = full.strip_prefix("refs/tags/") {
        Some(format!("tags/{}", s))
    } else if let Some(s) = full.strip_prefix("refs/heads/") {
        Some(s.to_string())
    } else if let Some(s) = full.strip_prefix("refs/remotes/") {
        if s.ends_with("/HEAD") {
            None
        } else {
            Some(format!("remotes/{}", s))
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::commit::CommitBuilder;
    use crate::storage::tree::TreeMutator;
    use crate::storage::types::GitSignature;
    use tempfile::TempDir;

    fn setup_repo_with_commit() -> (TempDir, Repository, CommitId) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let commit_id = {
            let tree_id = TreeMutator::empty(&repo).unwrap().write().unwrap();
            CommitBuilder::new(&repo)
                .tree(tree_id)
                .message("Initial commit")
                .signature(GitSignature::new("Test", "test@test.com"))
                .update_ref("refs/heads/master")
                .commit()
                .unwrap()
        };
        repo.set_head("refs/heads/master").unwrap();

        (dir, repo, commit_id)
    }

    fn second_commit(repo: &Repository, parent: CommitId) -> CommitId {
        let tree_id = TreeMutator::empty(repo).unwrap().write().unwrap();
        CommitBuilder::new(repo)
            .tree(tree_id)
            .parent(parent)
            .message("Second commit")
            .commit()
            .unwrap()
    }

    #[test]
    fn test_head_commit() {
        let (_dir, repo, expected) = setup_repo_with_commit();
        let head = RefManager::head_commit(&repo).unwrap();
        assert_eq!(head, expected);
        assert_eq!(
            RefManager::current_branch(&repo).unwrap(),
            Some(BranchName::new("master").unwrap())
        );
        assert!(!RefManager::is_detached(&repo).unwrap());
    }

    #[test]
    fn test_detached_head() {
        let (_dir, repo, commit) = setup_repo_with_commit();
        repo.set_head_detached(commit.raw()).unwrap();
        assert!(RefManager::is_detached(&repo).unwrap());
        assert_eq!(RefManager::current_branch(&repo).unwrap(), None);
    }

    #[test]
    fn test_branch_lifecycle() {
        let (_dir, repo, base_commit) = setup_repo_with_commit();

        let branch = BranchName::new("feature").unwrap();

        assert!(!RefManager::branch_exists(&repo, &branch));
        RefManager::create_branch(&repo, &branch, base_commit).unwrap();
        assert!(RefManager::branch_exists(&repo, &branch));

        let resolved = RefManager::resolve_branch(&repo, &branch).unwrap();
        assert_eq!(resolved, base_commit);

        RefManager::delete_branch(&repo, &branch).unwrap();
        assert!(!RefManager::branch_exists(&repo, &branch));
    }

    #[test]
    fn test_duplicate_branch_error() {
        let (_dir, repo, base_commit) = setup_repo_with_commit();
        let branch = BranchName::new("feature").unwrap();

        RefManager::create_branch(&repo, &branch, base_commit).unwrap();
        let result = RefManager::create_branch(&repo, &branch, base_commit);

        assert!(matches!(result, Err(StorageError::BranchAlreadyExists(_))));

        let next = second_commit(&repo, base_commit);
        RefManager::force_branch(&repo, &branch, next).unwrap();
        assert_eq!(RefManager::resolve_branch(&repo, &branch).unwrap(), next);
    }

    #[test]
    fn test_import_branches() {
        let (_dir, repo, base_commit) = setup_repo_with_commit();

        let import = BranchName::for_import("upstream", base_commit);
        RefManager::create_branch(&repo, &import, base_commit).unwrap();
        RefManager::create_branch(&repo, &BranchName::new("topic").unwrap(), base_commit).unwrap();

        let imports = RefManager::list_import_branches(&repo).unwrap();
        assert_eq!(imports, vec![import]);
        assert_eq!(RefManager::list_branches(&repo, None).unwrap().len(), 3);
    }

    #[test]
    fn test_update_branch_if_unchanged() {
        let (_dir, repo, commit1) = setup_repo_with_commit();
        let branch = BranchName::new("test").unwrap();

        RefManager::create_branch(&repo, &branch, commit1).unwrap();
        let commit2 = second_commit(&repo, commit1);

        RefManager::update_branch_if_unchanged(&repo, &branch, commit1, commit2).unwrap();

        let result = RefManager::update_branch_if_unchanged(&repo, &branch, commit1, commit2);
        assert!(matches!(result, Err(StorageError::ConcurrentModification { .. })));
    }

    #[test]
    fn test_named_refs() {
        let (_dir, repo, commit) = setup_repo_with_commit();
        repo.reference("refs/tags/v1.0", commit.raw(), true, "tag").unwrap();
        repo.reference("refs/remotes/origin/master", commit.raw(), true, "remote").unwrap();

        let names: Vec<_> = RefManager::named_refs(&repo)
            .unwrap()
            .into_iter()
            .map(|r| (r.display_name, r.is_tag))
            .collect();
        assert_eq!(
            names,
            vec![
                ("master".to_string(), false),
                ("remotes/origin/master".to_string(), false),
                ("tags/v1.0".to_string(), true),
            ]
        );
    }
}
