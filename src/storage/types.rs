//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use git2::{Oid, Repository, Time};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// This makes sure we don't accidentally pass a tree ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }

    /// check whether `prefix` abbreviates this ID
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.to_string().starts_with(&prefix.to_ascii_lowercase())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for CommitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for CommitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        CommitId::from_hex(&hex).map_err(de::Error::custom)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A local branch name.
///
/// Stored without the `refs/heads/` prefix; [`BranchName::as_ref_path`]
/// produces the full reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchName(String);

impl BranchName {
    /// prefix for branches created by the import command
    pub const IMPORT_PREFIX: &'static str = "import/";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        let name = name
            .strip_prefix("refs/heads/")
            .map(str::to_string)
            .unwrap_or(name);

        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }
        if name == "HEAD" {
            return Err(InvalidNameError::Reserved(name));
        }
        if name.contains("..") || name.ends_with('/') || name.starts_with('/') {
            return Err(InvalidNameError::InvalidPath(name));
        }
        if name.ends_with(".lock") {
            return Err(InvalidNameError::InvalidPath(name));
        }
        for (i, c) in name.chars().enumerate() {
            if c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\') {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }
        Ok(Self(name))
    }

    /// the default import branch for an upstream ref at a given commit
    ///
    /// e.g. `import/upstream-1a2b3c4`
    pub fn for_import(upstream: &str, at: CommitId) -> Self {
        let label: String = upstream
            .trim_start_matches("refs/")
            .trim_start_matches("heads/")
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '-',
            })
            .collect();
        Self(format!("{}{}-{}", Self::IMPORT_PREFIX, label.trim_matches('-'), at.short()))
    }

    /// check if this branch was created by the import command
    pub fn is_import_branch(&self) -> bool {
        self.0.starts_with(Self::IMPORT_PREFIX)
    }

    /// get the full ref path (e.g., "refs/heads/master")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// git signature (author/committer info)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
    /// fixed time in seconds since the epoch; `None` means "now"
    pub when: Option<i64>,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when: None,
        }
    }

    /// fallback identity when the repository has none configured
    pub fn git_upstream() -> Self {
        Self::new("git-upstream", "git-upstream@localhost")
    }

    /// the identity configured for the repository (`user.name`/`user.email`),
    /// falling back to [`GitSignature::git_upstream`]
    pub fn from_config(repo: &Repository) -> Self {
        match repo.signature() {
            Ok(sig) => Self::new(
                sig.name().unwrap_or("git-upstream"),
                sig.email().unwrap_or("git-upstream@localhost"),
            ),
            Err(_) => Self::git_upstream(),
        }
    }

    /// pin the signature to a fixed time
    pub fn at(mut self, seconds: i64) -> Self {
        self.when = Some(seconds);
        self
    }

    /// convert to git2::Signature
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        match self.when {
            Some(seconds) => git2::Signature::new(&self.name, &self.email, &Time::new(seconds, 0)),
            None => git2::Signature::now(&self.name, &self.email),
        }
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::git_upstream()
    }
}

/// error type for invalid branch names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character '{}' at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_valid() {
        assert!(BranchName::new("master").is_ok());
        assert!(BranchName::new("upstream/master").is_ok());
        assert!(BranchName::new("import/upstream-1a2b3c4").is_ok());
        assert_eq!(BranchName::new("refs/heads/main").unwrap().as_str(), "main");
    }

    #[test]
    fn test_branch_name_invalid() {
        assert!(BranchName::new("").is_err());
        assert!(BranchName::new("HEAD").is_err());
        assert!(BranchName::new("a..b").is_err());
        assert!(BranchName::new("trailing/").is_err());
        assert!(BranchName::new("with space").is_err());
        assert!(BranchName::new("master~1").is_err());
        assert!(BranchName::new("topic.lock").is_err());
    }

    #[test]
    fn test_import_branch_name() {
        let id = CommitId::from_hex("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        let branch = BranchName::for_import("upstream/master", id);
        assert_eq!(branch.as_str(), "import/upstream-master-1a2b3c4");
        assert!(branch.is_import_branch());
        assert_eq!(branch.as_ref_path(), "refs/heads/import/upstream-master-1a2b3c4");
    }

    #[test]
    fn test_commit_id_prefix() {
        let id = CommitId::from_hex("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        assert!(id.matches_prefix("1a2b3c4"));
        assert!(id.matches_prefix("1A2B"));
        assert!(!id.matches_prefix(""));
        assert!(!id.matches_prefix("ffff"));
        assert_eq!(id.short(), "1a2b3c4");
    }

    #[test]
    fn test_commit_id_serde() {
        let id = CommitId::from_hex("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d\"");
        let back: CommitId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
