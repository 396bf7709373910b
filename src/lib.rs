//! git-upstream - import upstream changes into a locally carried branch
//!
//! This crate replays the commits a local branch carries on top of a fresh
//! upstream tip, optionally letting a sequence editor reshape the plan
//! first, and records the result on the local branch with a merge that
//! supersedes the previous import.
//!
//! # Example
//!
//! ```no_run
//! use git_upstream::import::{ImportConfig, Importer};
//! use git_upstream::storage::GitRepository;
//!
//! let repo = GitRepository::discover(".").unwrap();
//! let importer = Importer::new(repo, ImportConfig::new());
//! importer.import("upstream/master", Some("master")).unwrap();
//! ```

pub mod graph;
pub mod import;
pub mod replay;
pub mod scenario;
pub mod storage;

#[cfg(test)]
mod testing;
