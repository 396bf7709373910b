//! storage layer for git-upstream
//!
//! this module is the VCS query/command adapter. The upper layers (graph
//! model, replay engine, import command, scenario builder) use this API and
//! never touch git2 directly.
//!
//! # Layout
//!
//! ```text
//!   graph / replay / import / scenario
//!                  │
//!                  ▼
//!   GitRepository ─── impl VcsQuery (query: name-rev, versions, ref globs)
//!        │
//!        ├── refs    branches, HEAD, compare-and-swap updates
//!        ├── tree    snapshots and TreeMutator
//!        └── commit  CommitInfo, CommitBuilder, revwalks, patch ids
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use git_upstream::storage::{GitRepository, VcsQuery};
//!
//! let repo = GitRepository::discover(".")?;
//! if !repo.check_minimum_version(1, 7, 5) {
//!     eprintln!("git is too old");
//! }
//! let name = repo.resolve_symbolic_name(repo.head()?)?;
//! println!("{}", name.unwrap_or_default());
//! ```

mod commit;
mod error;
mod query;
mod refs;
mod repository;
mod tree;
mod types;

pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use query::{parse_git_version, version_at_least, RefPattern, VcsQuery};
pub use refs::NamedRef;
pub use repository::{CherryPickResult, GitRepository, TreeSnapshot};
pub use types::{BranchName, CommitId, GitSignature, InvalidNameError, TreeId};

pub(crate) use error::paths_display;
