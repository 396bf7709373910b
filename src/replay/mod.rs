//! Replaying commits onto a branch.
//!
//! A [`ReplayPlan`] is built from a [`CommitRange`](crate::graph::CommitRange),
//! optionally handed to a [`SequenceEditor`], then applied by the
//! [`ReplayEngine`] one cherry-pick at a time. Halted replays persist their
//! [`ReplayState`] under the git directory and can be resumed or aborted by a
//! later process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ReplayEngine                           │
//! │      (begin / in_progress / resume / abort, one at a time)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ ReplayPlan  │       │  Sequence   │       │ StateStore  │
//!  │ (todo list) │       │   Editor    │       │ (halted run)│
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use git_upstream::replay::{ReplayEngine, ReplayMode, ReplayOutcome, ReplayPlan};
//!
//! let plan = ReplayPlan::from_range(&range);
//! let engine = ReplayEngine::new(repo);
//!
//! match engine.begin(plan, &target, ReplayMode::Automated)? {
//!     ReplayOutcome::Completed(done) => println!("replayed {}", done.new_commits().len()),
//!     ReplayOutcome::Conflicted(halted) => {
//!         // fix the paths, stage them, then
//!         halted.resume()?;
//!     }
//!     ReplayOutcome::Stopped(stopped) => { stopped.resume()?; }
//!     ReplayOutcome::Aborted(_) => {}
//! }
//! ```

mod editor;
mod engine;
mod error;
mod plan;
mod state;

pub use editor::{CommandEditor, HookOutcome, SequenceEditor};
pub use engine::{Aborted, Completed, Conflicted, Replay, ReplayEngine, ReplayMode, ReplayOutcome, Stopped};
pub use error::{ReplayError, ReplayResult};
pub use plan::{PlanEntry, ReplayAction, ReplayPlan};
pub use state::{AppliedCommit, ReplayState, ReplayStatus, StateStore};
