//! The import command: replay local changes onto upstream.
//!
//! An import resolves the commits `head` carries that `upstream` lacks,
//! replays them onto a fresh import branch at `upstream`'s tip, and records
//! a superseding merge on `head` whose tree is the import branch's tree.
//! The next import then only replays what was committed on `head` since.
//!
//! ```text
//!   upstream ── C ─────────── D' ── E'   import/upstream-<C>
//!               │                    \
//!   head     ── D ── E ────────────── M   Merge branch 'import/...' into head
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use git_upstream::import::{ImportConfig, Importer, ImportOutcome};
//!
//! let importer = Importer::new(repo, ImportConfig::new().interactive(true));
//! match importer.import("upstream/master", None)? {
//!     ImportOutcome::UpToDate => println!("up to date"),
//!     ImportOutcome::Imported(summary) => println!("replayed {}", summary.replayed.len()),
//!     ImportOutcome::Planned { .. } => {}
//! }
//! ```

mod config;
mod error;
mod importer;

pub use config::{resolve_sequence_editor, ImportConfig, ImportMode, DEFAULT_EDITOR};
pub use error::{ImportError, ImportResult};
pub use importer::{ImportOutcome, ImportSummary, Importer};
