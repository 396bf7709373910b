//! Persisted replay progress.
//!
//! A halted replay (conflict, `edit` stop) writes its state to
//! `<gitdir>/upstream-replay/state.json` so it can be continued or aborted
//! from a later process. The directory doubles as the in-progress marker.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use crate::replay::error::ReplayResult;
use crate::replay::plan::ReplayPlan;
use crate::storage::{BranchName, CommitId};

const STATE_DIR: &str = "upstream-replay";
const STATE_FILE: &str = "state.json";

/// Lifecycle of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    Pending,
    Applying,
    Completed,
    Conflicted,
    Stopped,
    Aborted,
}

impl ReplayStatus {
    /// Whether the replay is paused and waiting for continue or abort.
    pub fn is_halted(&self) -> bool {
        matches!(self, ReplayStatus::Conflicted | ReplayStatus::Stopped)
    }
}

/// A commit created by the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCommit {
    pub original: CommitId,
    pub replayed: CommitId,
    /// commits squashed into this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folded: Vec<CommitId>,
}

/// Everything needed to continue a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayState {
    pub session: Ulid,
    pub status: ReplayStatus,
    pub target: BranchName,
    /// the branch HEAD was on before the replay started
    pub original_head: Option<BranchName>,
    /// tip of `target` before anything was applied
    pub original_tip: CommitId,
    /// tip of `target` after the last applied entry
    pub current_tip: CommitId,
    pub plan: ReplayPlan,
    /// index of the next plan entry to process
    pub next: usize,
    /// index of the entry the replay halted on
    #[serde(default)]
    pub halted_at: Option<usize>,
    pub applied: Vec<AppliedCommit>,
    /// entries whose change was already present on the target
    pub skipped: Vec<CommitId>,
    pub conflicts: Vec<PathBuf>,
    /// caller-defined context, kept across processes
    pub labels: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
}

impl ReplayState {
    pub(crate) fn new(
        target: BranchName,
        original_head: Option<BranchName>,
        tip: CommitId,
        plan: ReplayPlan,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            session: Ulid::new(),
            status: ReplayStatus::Pending,
            target,
            original_head,
            original_tip: tip,
            current_tip: tip,
            plan,
            next: 0,
            halted_at: None,
            applied: Vec::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
            labels,
            started_at: Utc::now(),
        }
    }
}

/// Reads and writes [`ReplayState`] inside a git directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: git_dir.as_ref().join(STATE_DIR),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    pub fn load(&self) -> ReplayResult<Option<ReplayState>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write atomically: a temp file in the same directory, then rename.
    pub fn save(&self, state: &ReplayState) -> ReplayResult<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, self.path())?;
        debug!(session = %state.session, status = ?state.status, next = state.next, "saved replay state");
        Ok(())
    }

    pub fn clear(&self) -> ReplayResult<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}
