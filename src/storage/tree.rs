//! tree operations for building commit content.
//!
//! in Git, a tree is a directory. The replay engine only ever reads trees
//! (to compare them and to compute patch ids); the scenario builder writes
//! them to synthesize commits without touching a working directory.
//!
//! this module provides safe abstractions over Git's tree manipulation,
//! which is notoriously fiddly to get right.

use std::collections::HashMap;

use git2::{FileMode, ObjectType, Repository, Tree, TreeBuilder as Git2TreeBuilder};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::TreeId;

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// get the tree ID
    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    /// get the underlying git2::Tree (for internal use)
    pub(crate) fn inner(&self) -> &Tree<'repo> {
        &self.tree
    }

    /// list the names of all top-level files
    pub fn list_files(&self) -> Vec<String> {
        self.tree
            .iter()
            .filter(|entry| entry.kind() == Some(ObjectType::Blob))
            .filter_map(|entry| entry.name().map(str::to_string))
            .collect()
    }

    /// read the content of the file at `path` (`dir/file` allowed)
    pub fn read_file(&self, repo: &Repository, path: &str) -> StorageResult<Option<Vec<u8>>> {
        let entry = match self.tree.get_path(std::path::Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = repo.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }
}

/// a mutable tree builder for making changes
///
/// this adds up changes and produces a new tree when it's written;
/// the original tree is not modified
///
/// # Usage Pattern
///
/// ```ignore
/// let mut builder = TreeMutator::from_tree(repo, &tree)?;
/// builder.upsert_file("README", b"hello")?;
/// builder.upsert_file("docs/guide.txt", b"...")?;
/// let new_tree_id = builder.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    /// the root tree we're modifying
    root_builder: Git2TreeBuilder<'repo>,
    /// builders for directories touched so far (one level deep)
    modified_dirs: HashMap<String, Git2TreeBuilder<'repo>>,
    /// original directory tree IDs for directories we haven't touched
    original_dirs: HashMap<String, git2::Oid>,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn from_tree(repo: &'repo Repository, tree: &TreeHandle<'_>) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(Some(tree.inner()))?;

        let mut original_dirs = HashMap::new();
        for entry in tree.inner().iter() {
            if entry.kind() == Some(ObjectType::Tree) {
                if let Some(name) = entry.name() {
                    original_dirs.insert(name.to_string(), entry.id());
                }
            }
        }

        Ok(Self {
            repo,
            root_builder,
            modified_dirs: HashMap::new(),
            original_dirs,
        })
    }

    /// create a new TreeMutator for an empty tree
    pub fn empty(repo: &'repo Repository) -> StorageResult<Self> {
        let root_builder = repo.treebuilder(None)?;
        Ok(Self {
            repo,
            root_builder,
            modified_dirs: HashMap::new(),
            original_dirs: HashMap::new(),
        })
    }

    /// get or create a builder for a directory's subtree
    fn dir_builder(&mut self, dir: &str) -> StorageResult<&mut Git2TreeBuilder<'repo>> {
        if !self.modified_dirs.contains_key(dir) {
            let builder = match self.original_dirs.get(dir) {
                Some(original_id) => {
                    let original_tree = self.repo.find_tree(*original_id)?;
                    self.repo.treebuilder(Some(&original_tree))?
                }
                None => self.repo.treebuilder(None)?,
            };
            self.modified_dirs.insert(dir.to_string(), builder);
        }
        self.modified_dirs
            .get_mut(dir)
            .ok_or_else(|| StorageError::Internal(format!("missing builder for {}", dir)))
    }

    /// insert or replace a file with the given content
    pub fn upsert_file(&mut self, path: &str, contents: &[u8]) -> StorageResult<()> {
        let blob = self.repo.blob(contents)?;
        match split_path(path)? {
            (None, name) => {
                self.root_builder.insert(name, blob, FileMode::Blob.into())?;
            }
            (Some(dir), name) => {
                self.dir_builder(dir)?.insert(name, blob, FileMode::Blob.into())?;
            }
        }
        Ok(())
    }

    /// remove a file, failing if it doesn't exist
    pub fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        let missing = |_| StorageError::Internal(format!("no such file in tree: {}", path));
        match split_path(path)? {
            (None, name) => self.root_builder.remove(name).map_err(missing)?,
            (Some(dir), name) => self.dir_builder(dir)?.remove(name).map_err(missing)?,
        }
        Ok(())
    }

    /// write all changes and return the new root tree ID
    pub fn write(mut self) -> StorageResult<TreeId> {
        for (dir, builder) in self.modified_dirs {
            if builder.is_empty() {
                if self.root_builder.get(&dir)?.is_some() {
                    self.root_builder.remove(&dir)?;
                }
                continue;
            }
            let dir_tree_id = builder.write()?;
            self.root_builder.insert(&dir, dir_tree_id, FileMode::Tree.into())?;
        }

        let root_id = self.root_builder.write()?;
        Ok(TreeId::new(root_id))
    }
}

/// split `dir/name` into its parts; deeper nesting is not supported
fn split_path(path: &str) -> StorageResult<(Option<&str>, &str)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((None, name)),
        [dir, name] if !dir.is_empty() && !name.is_empty() => Ok((Some(dir), name)),
        _ => Err(StorageError::Internal(format!("unsupported tree path: {}", path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn handle(repo: &Repository, id: TreeId) -> TreeHandle<'_> {
        TreeHandle::new(repo.find_tree(id.raw()).unwrap())
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, repo) = setup_repo();
        let tree_id = TreeMutator::empty(&repo).unwrap().write().unwrap();
        assert!(handle(&repo, tree_id).list_files().is_empty());
    }

    #[test]
    fn test_upsert_and_read_files() {
        let (_dir, repo) = setup_repo();
        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.upsert_file("a.txt", b"alpha").unwrap();
        mutator.upsert_file("docs/b.txt", b"beta").unwrap();
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        assert_eq!(tree.list_files(), vec!["a.txt".to_string()]);
        assert_eq!(tree.read_file(&repo, "a.txt").unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(tree.read_file(&repo, "docs/b.txt").unwrap(), Some(b"beta".to_vec()));
        assert_eq!(tree.read_file(&repo, "missing.txt").unwrap(), None);
    }

    #[test]
    fn test_modify_existing_tree() {
        let (_dir, repo) = setup_repo();
        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.upsert_file("docs/b.txt", b"beta").unwrap();
        let first = mutator.write().unwrap();

        let base = handle(&repo, first);
        let mut mutator = TreeMutator::from_tree(&repo, &base).unwrap();
        mutator.upsert_file("docs/c.txt", b"gamma").unwrap();
        mutator.upsert_file("docs/b.txt", b"beta v2").unwrap();
        let second = mutator.write().unwrap();

        let tree = handle(&repo, second);
        assert_eq!(tree.read_file(&repo, "docs/b.txt").unwrap(), Some(b"beta v2".to_vec()));
        assert_eq!(tree.read_file(&repo, "docs/c.txt").unwrap(), Some(b"gamma".to_vec()));
        // original snapshot is untouched
        assert_eq!(base.read_file(&repo, "docs/c.txt").unwrap(), None);
    }

    #[test]
    fn test_remove_file() {
        let (_dir, repo) = setup_repo();
        let mut mutator = TreeMutator::empty(&repo).unwrap();
        mutator.upsert_file("a.txt", b"alpha").unwrap();
        mutator.upsert_file("docs/b.txt", b"beta").unwrap();
        let tree_id = mutator.write().unwrap();

        let base = handle(&repo, tree_id);
        let mut mutator = TreeMutator::from_tree(&repo, &base).unwrap();
        mutator.remove_file("docs/b.txt").unwrap();
        assert!(mutator.remove_file("nope.txt").is_err());
        let tree_id = mutator.write().unwrap();

        let tree = handle(&repo, tree_id);
        assert_eq!(tree.read_file(&repo, "docs/b.txt").unwrap(), None);
        assert_eq!(tree.read_file(&repo, "a.txt").unwrap(), Some(b"alpha".to_vec()));
    }

    #[test]
    fn test_rejects_deep_paths() {
        let (_dir, repo) = setup_repo();
        let mut mutator = TreeMutator::empty(&repo).unwrap();
        assert!(mutator.upsert_file("a/b/c.txt", b"x").is_err());
        assert!(mutator.upsert_file("", b"x").is_err());
    }
}
