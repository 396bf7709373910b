//! Read-only repository queries.
//!
//! [`VcsQuery`] is the narrow capability the rest of the crate uses to ask
//! questions about a repository: what a commit is called, whether it is
//! reachable from any ref, whether HEAD is detached and which git version is
//! installed. [`GitRepository`](crate::storage::GitRepository) implements it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::process::Command;
use std::sync::OnceLock;

use git2::Repository;
use regex::Regex;
use tracing::debug;

use crate::storage::commit::is_ancestor;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::{NamedRef, RefManager};
use crate::storage::types::CommitId;

/// Cost of stepping to a non-mainline parent; large enough that any
/// first-parent path is preferred over crossing a merge.
const MERGE_TRAVERSAL_WEIGHT: u64 = 65_535;

/// Repository queries, consumed by composition.
pub trait VcsQuery {
    /// The most specific human-readable name for `id`, `git name-rev`
    /// style (`master`, `tags/v1.0~2`, `master~1^2`).
    ///
    /// Unknown commits and commits no ref can reach return `None`.
    fn resolve_symbolic_name(&self, id: CommitId) -> StorageResult<Option<String>>;

    /// Like [`VcsQuery::resolve_symbolic_name`], but only refs matching the
    /// shell glob `pattern` are used as naming candidates.
    fn resolve_symbolic_name_matching(&self, id: CommitId, pattern: &str) -> StorageResult<Option<String>>;

    /// Whether `id` is reachable from any ref.
    fn is_reachable(&self, id: CommitId) -> StorageResult<bool> {
        Ok(self.resolve_symbolic_name(id)?.is_some())
    }

    /// Whether HEAD points directly at a commit instead of a branch.
    fn is_detached_head(&self) -> StorageResult<bool>;

    /// The self-reported version string of the installed git tool.
    fn tool_version(&self) -> Option<String>;

    /// Whether the installed git is at least `major.minor.patch`.
    ///
    /// An unparseable or missing version counts as unsupported.
    fn check_minimum_version(&self, major: u32, minor: u32, patch: u32) -> bool {
        match self.tool_version() {
            Some(version) => version_at_least(&version, major, minor, patch),
            None => false,
        }
    }
}

/// A shell glob over ref names (`refs/heads/upstream/*`).
#[derive(Debug, Clone)]
pub struct RefPattern {
    regex: Regex,
}

impl RefPattern {
    /// compile a glob; `*` matches any run of characters, `?` one character
    pub fn new(glob: &str) -> StorageResult<Self> {
        let mut expr = String::from("^");
        for c in glob.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                c => expr.push_str(&regex::escape(&c.to_string())),
            }
        }
        expr.push('$');
        let regex = Regex::new(&expr)
            .map_err(|e| StorageError::Internal(format!("bad ref pattern {}: {}", glob, e)))?;
        Ok(Self { regex })
    }

    /// match against either the full ref name or its display form
    pub fn matches(&self, named: &NamedRef) -> bool {
        self.regex.is_match(&named.full_name) || self.regex.is_match(&named.display_name)
    }
}

/// Name `id` relative to the refs of `repo`, optionally filtered.
pub(crate) fn symbolic_name(
    repo: &Repository,
    id: CommitId,
    pattern: Option<&RefPattern>,
) -> StorageResult<Option<String>> {
    if repo.find_commit(id.raw()).is_err() {
        debug!(commit = %id, "cannot name unknown commit");
        return Ok(None);
    }

    let mut best: Option<(u64, bool, String)> = None;
    for named in RefManager::named_refs(repo)? {
        if let Some(p) = pattern {
            if !p.matches(&named) {
                continue;
            }
        }
        if !is_ancestor(repo, id, named.target)? {
            continue;
        }
        if let Some((cost, name)) = shortest_name(repo, &named, id)? {
            // lower cost wins, then tags, then the lexically smaller name
            let candidate = (cost, !named.is_tag, name);
            if best.as_ref().map_or(true, |b| candidate < *b) {
                best = Some(candidate);
            }
        }
    }

    Ok(best.map(|(_, _, name)| name))
}

/// Cheapest path from the tip of `named` down to `target`.
fn shortest_name(repo: &Repository, named: &NamedRef, target: CommitId) -> StorageResult<Option<(u64, String)>> {
    // (cost, commit, base name, generations below base)
    let mut queue = BinaryHeap::new();
    queue.push(Reverse((0u64, named.target, named.display_name.clone(), 0u32)));
    let mut settled = HashSet::new();

    while let Some(Reverse((cost, commit_id, base, generation))) = queue.pop() {
        if !settled.insert(commit_id) {
            continue;
        }
        let name = match generation {
            0 => base,
            n => format!("{}~{}", base, n),
        };
        if commit_id == target {
            return Ok(Some((cost, name)));
        }

        let commit = repo.find_commit(commit_id.raw())?;
        for (index, parent) in commit.parent_ids().enumerate() {
            let parent = CommitId::new(parent);
            if settled.contains(&parent) || !is_ancestor(repo, target, parent)? {
                continue;
            }
            if index == 0 {
                let base = name_base(&name, generation);
                queue.push(Reverse((cost + 1, parent, base, generation + 1)));
            } else {
                queue.push(Reverse((
                    cost + MERGE_TRAVERSAL_WEIGHT,
                    parent,
                    format!("{}^{}", name, index + 1),
                    0,
                )));
            }
        }
    }

    Ok(None)
}

/// strip the `~n` suffix a name gained from its generation
fn name_base(name: &str, generation: u32) -> String {
    match generation {
        0 => name.to_string(),
        n => name
            .strip_suffix(&format!("~{}", n))
            .unwrap_or(name)
            .to_string(),
    }
}

fn version_regex() -> &'static Regex {
    static VERSION: OnceLock<Regex> = OnceLock::new();
    VERSION.get_or_init(|| {
        Regex::new(r"^git version ([0-9]+)\.([0-9]+)\.([0-9]+)(\.(.+))*$").expect("valid version regex")
    })
}

/// Parse `git version X.Y.Z(.extra)?` into its numeric triple.
pub fn parse_git_version(version: &str) -> Option<(u32, u32, u32)> {
    let captures = version_regex().captures(version.trim())?;
    let major = captures.get(1)?.as_str().parse().ok()?;
    let minor = captures.get(2)?.as_str().parse().ok()?;
    let patch = captures.get(3)?.as_str().parse().ok()?;
    Some((major, minor, patch))
}

/// Numeric comparison of a version string against a minimum triple.
pub fn version_at_least(version: &str, major: u32, minor: u32, patch: u32) -> bool {
    match parse_git_version(version) {
        Some(installed) => installed >= (major, minor, patch),
        None => false,
    }
}

/// Output of `git --version`, or None when git cannot be run.
pub(crate) fn installed_git_version() -> Option<String> {
    let output = Command::new("git").arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}
