//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change in Git. For an import:
//! - the range to replay is a walk over commit history
//! - each replayed commit is recreated on top of a new tip
//! - deciding whether a change was already replayed needs patch ids
//!
//! this module handles commit creation, history walking, and patch identity

use chrono::{DateTime, TimeZone, Utc};
use git2::{Oid, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{CommitId, GitSignature, TreeId};

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            committer_name: committer.name().unwrap_or("Unknown").to_string(),
            committer_email: committer.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// check if this is a root commit
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get the first (mainline) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// the subject line (first line of the message)
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    author: Option<git2::Signature<'static>>,
    committer: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            author: None,
            committer: GitSignature::git_upstream(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set multiple parents (for merge commits)
    pub fn parents(mut self, parents: Vec<CommitId>) -> Self {
        self.parents = parents;
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the committer signature (also the author unless one is kept)
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.committer = signature;
        self
    }

    /// keep the author of an existing commit
    pub fn author_from(mut self, commit: CommitId) -> StorageResult<Self> {
        let original = self
            .repo
            .find_commit(commit.raw())
            .map_err(|_| StorageError::CommitNotFound(commit.to_string()))?;
        self.author = Some(original.author().to_owned());
        Ok(self)
    }

    /// update a ref (branch) to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let committer = self.committer.to_git2_signature()?;
        let author = match self.author {
            Some(author) => author,
            None => committer.clone(),
        };

        // collect parent commits
        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self.repo.commit(
            self.update_ref.as_deref(),
            &author,
            &committer,
            &self.message,
            &tree,
            &parent_refs,
        )?;

        Ok(CommitId::new(oid))
    }
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// get the tree snapshot at a specific commit
pub fn get_tree_at_commit(repo: &Repository, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
    let commit = repo
        .find_commit(commit_id.raw())
        .map_err(|_| StorageError::CommitNotFound(commit_id.to_string()))?;

    let tree = commit.tree()?;
    Ok(TreeHandle::new(tree))
}

/// resolve any revision git understands (`master`, `HEAD~2`, `v1^2`, a hex id)
pub fn resolve_revision(repo: &Repository, spec: &str) -> StorageResult<CommitId> {
    let object = repo
        .revparse_single(spec)
        .map_err(|_| StorageError::CommitNotFound(spec.to_string()))?;
    let commit = object
        .peel_to_commit()
        .map_err(|_| StorageError::CommitNotFound(spec.to_string()))?;
    Ok(CommitId::new(commit.id()))
}

/// find the merge base (common ancestor) of two commits
///
/// returns None if there is no common ancestor
pub fn find_merge_base(repo: &Repository, a: CommitId, b: CommitId) -> StorageResult<Option<CommitId>> {
    match repo.merge_base(a.raw(), b.raw()) {
        Ok(oid) => Ok(Some(CommitId::new(oid))),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// check whether `ancestor` is reachable from `descendant` (or equal to it)
pub fn is_ancestor(repo: &Repository, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(repo.graph_descendant_of(descendant.raw(), ancestor.raw())?)
}

/// the patch id of a single-parent (or root) commit's change
///
/// two commits carrying the same change have the same patch id, regardless
/// of where they sit in history. Merges have no patch id.
pub fn patch_id(repo: &Repository, id: CommitId) -> StorageResult<Option<Oid>> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;
    if commit.parent_count() > 1 {
        return Ok(None);
    }

    let new_tree = commit.tree()?;
    let old_tree = match commit.parent_count() {
        0 => None,
        _ => Some(commit.parent(0)?.tree()?),
    };
    let diff = repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)?;
    if diff.deltas().len() == 0 {
        return Ok(None);
    }
    Ok(Some(diff.patchid(None)?))
}

/// iterate over commit history
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator, newest first
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        Ok(Self { repo, revwalk })
    }

    /// stop at anything reachable from `boundary`
    pub fn hide(mut self, boundary: CommitId) -> StorageResult<Self> {
        self.revwalk.hide(boundary.raw())?;
        Ok(self)
    }

    /// yield the oldest commits first
    pub fn oldest_first(mut self) -> StorageResult<Self> {
        self.revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;
        Ok(self)
    }

    /// only follow first parents (linear history through merges)
    pub fn first_parent_only(mut self) -> StorageResult<Self> {
        self.revwalk.simplify_first_parent()?;
        Ok(self)
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// message formatting for commits created by the import
pub struct CommitMessage;

impl CommitMessage {
    /// the superseding merge that records an import on the head branch
    pub fn import_merge(import_branch: &str, head_branch: &str) -> String {
        format!("Merge branch '{}' into {}", import_branch, head_branch)
    }

    /// replace the subject line of `original`, keeping its body
    pub fn reword(original: &str, subject: &str) -> String {
        let mut lines = original.splitn(2, '\n');
        let _ = lines.next();
        match lines.next() {
            Some(rest) if !rest.trim().is_empty() => format!("{}\n{}", subject.trim(), rest),
            _ => format!("{}\n", subject.trim()),
        }
    }

    /// the message of a commit folded into its predecessor
    pub fn squash(previous: &str, folded: &str) -> String {
        format!("{}\n\n{}", previous.trim_end(), folded.trim_end()) + "\n"
    }
}
