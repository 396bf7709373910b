//! The replay engine.
//!
//! Replays a [`ReplayPlan`] onto a target branch one cherry-pick at a time,
//! moving the branch after every created commit. A replay that cannot
//! finish in one go comes back as a typed handle:
//!
//! - [`Replay<Conflicted>`]: a cherry-pick left conflict markers behind
//! - [`Replay<Stopped>`]: an `edit` entry was applied and the user asked
//!   to amend it
//!
//! Both can be resumed or aborted, in this process or a later one (see
//! [`ReplayEngine::in_progress`]).

use std::collections::{BTreeMap, HashSet};
use std::marker::PhantomData;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::graph::CommitGraph;
use crate::replay::editor::{HookOutcome, SequenceEditor};
use crate::replay::error::{ReplayError, ReplayResult};
use crate::replay::plan::{PlanEntry, ReplayAction, ReplayPlan};
use crate::replay::state::{AppliedCommit, ReplayState, ReplayStatus, StateStore};
use crate::storage::{BranchName, CherryPickResult, CommitId, CommitMessage, GitRepository, StorageError, TreeId};

/// Whether the sequence editor gets to see the plan first.
#[derive(Clone, Copy)]
pub enum ReplayMode<'a> {
    Automated,
    Interactive(&'a dyn SequenceEditor),
}

/// Marker type for finished replays.
#[derive(Debug)]
pub struct Completed;

/// Marker type for replays halted on a conflict.
#[derive(Debug)]
pub struct Conflicted;

/// Marker type for replays paused on an `edit` entry.
#[derive(Debug)]
pub struct Stopped;

/// Marker type for abandoned replays.
#[derive(Debug)]
pub struct Aborted;

/// A replay in a particular lifecycle state.
pub struct Replay<S> {
    state: ReplayState,
    repo: GitRepository,
    store: StateStore,
    _state: PhantomData<S>,
}

impl<S> Replay<S> {
    fn from_state(repo: GitRepository, store: StateStore, state: ReplayState) -> Self {
        Self {
            state,
            repo,
            store,
            _state: PhantomData,
        }
    }

    pub fn session(&self) -> Ulid {
        self.state.session
    }

    pub fn status(&self) -> ReplayStatus {
        self.state.status
    }

    pub fn target(&self) -> &BranchName {
        &self.state.target
    }

    /// Tip of the target before the replay started.
    pub fn original_tip(&self) -> CommitId {
        self.state.original_tip
    }

    /// Tip of the target after the last applied entry.
    pub fn tip(&self) -> CommitId {
        self.state.current_tip
    }

    pub fn plan(&self) -> &ReplayPlan {
        &self.state.plan
    }

    pub fn applied(&self) -> &[AppliedCommit] {
        &self.state.applied
    }

    /// Entries whose change was already on the target.
    pub fn skipped(&self) -> &[CommitId] {
        &self.state.skipped
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.state.labels.get(key).map(String::as_str)
    }

    pub fn state(&self) -> &ReplayState {
        &self.state
    }

    /// The entry the replay halted on, if any.
    pub fn halted_entry(&self) -> Option<&PlanEntry> {
        self.state.halted_at.and_then(|i| self.state.plan.entries().get(i))
    }
}

impl Replay<Completed> {
    /// The commits created, oldest first.
    pub fn new_commits(&self) -> Vec<CommitId> {
        self.state.applied.iter().map(|a| a.replayed).collect()
    }
}

impl Replay<Conflicted> {
    pub fn conflicting_paths(&self) -> &[PathBuf] {
        &self.state.conflicts
    }

    /// Commit the resolved index for the halted entry and carry on.
    pub fn resume(self) -> ReplayResult<ReplayOutcome> {
        let Replay {
            mut state, repo, store, ..
        } = self;

        let paths = repo.index_conflicts()?;
        if !paths.is_empty() {
            return Err(ReplayError::UnresolvedConflicts { paths });
        }
        let index = state.next;
        let entry = state
            .plan
            .entries()
            .get(index)
            .cloned()
            .ok_or_else(|| StorageError::Internal(format!("halted entry {} is outside the plan", index)))?;

        info!(session = %state.session, commit = %entry.commit, "resuming after conflict");
        let tree = repo.write_index_tree()?;
        record(&repo, &mut state, &entry, tree)?;
        state.next += 1;
        state.conflicts.clear();
        state.halted_at = None;

        if entry.action == ReplayAction::Edit {
            return stop(repo, store, state, index);
        }
        drive(repo, store, state)
    }

    /// Restore the target and discard the replay.
    pub fn abort(self) -> ReplayResult<Replay<Aborted>> {
        abort_replay(self.repo, self.store, self.state)
    }
}

impl Replay<Stopped> {
    /// Continue after the pause. Amendments made to the target's tip while
    /// stopped are kept.
    pub fn resume(self) -> ReplayResult<ReplayOutcome> {
        let Replay {
            mut state, repo, store, ..
        } = self;

        repo.ensure_clean()?;
        let tip = repo.resolve_branch(&state.target)?;
        if tip != state.current_tip {
            debug!(old = %state.current_tip, new = %tip, "target amended while stopped");
            if let Some(last) = state.applied.last_mut() {
                last.replayed = tip;
            }
            state.current_tip = tip;
        }
        repo.checkout_branch(&state.target)?;
        state.halted_at = None;

        info!(session = %state.session, next = state.next, "resuming stopped replay");
        drive(repo, store, state)
    }

    /// Restore the target and discard the replay.
    pub fn abort(self) -> ReplayResult<Replay<Aborted>> {
        abort_replay(self.repo, self.store, self.state)
    }
}

/// Where a `begin` or `resume` ended up.
pub enum ReplayOutcome {
    Completed(Replay<Completed>),
    Conflicted(Replay<Conflicted>),
    Stopped(Replay<Stopped>),
    Aborted(Replay<Aborted>),
}

impl ReplayOutcome {
    pub fn state(&self) -> &ReplayState {
        match self {
            ReplayOutcome::Completed(r) => r.state(),
            ReplayOutcome::Conflicted(r) => r.state(),
            ReplayOutcome::Stopped(r) => r.state(),
            ReplayOutcome::Aborted(r) => r.state(),
        }
    }

    pub fn status(&self) -> ReplayStatus {
        self.state().status
    }

    /// The completed replay, or the reason it did not complete.
    pub fn into_completed(self) -> ReplayResult<Replay<Completed>> {
        match self {
            ReplayOutcome::Completed(replay) => Ok(replay),
            ReplayOutcome::Conflicted(replay) => {
                let (commit, subject) = halted_commit(&replay);
                Err(ReplayError::Conflict {
                    commit,
                    subject,
                    paths: replay.state.conflicts.clone(),
                })
            }
            ReplayOutcome::Stopped(replay) => {
                let (commit, subject) = halted_commit(&replay);
                Err(ReplayError::Stopped { commit, subject })
            }
            ReplayOutcome::Aborted(_) => Err(ReplayError::Aborted),
        }
    }
}

fn halted_commit<S>(replay: &Replay<S>) -> (CommitId, String) {
    match replay.halted_entry() {
        Some(entry) => (entry.commit, entry.subject.clone()),
        None => (replay.tip(), String::new()),
    }
}

/// Starts, reloads and finishes replays for one repository.
pub struct ReplayEngine {
    repo: GitRepository,
    graph: CommitGraph,
    store: StateStore,
    labels: BTreeMap<String, String>,
}

impl ReplayEngine {
    pub fn new(repo: GitRepository) -> Self {
        let store = StateStore::new(repo.git_dir());
        Self {
            graph: CommitGraph::new(repo.clone()),
            repo,
            store,
            labels: BTreeMap::new(),
        }
    }

    /// Attach caller context that survives in the persisted state.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Whether a halted replay exists for this repository.
    pub fn is_in_progress(&self) -> bool {
        self.store.exists()
    }

    /// Replay `plan` onto `target`.
    ///
    /// Nothing is mutated until the (possibly edited) plan has been
    /// validated and at least one entry is known to apply.
    pub fn begin(&self, plan: ReplayPlan, target: &BranchName, mode: ReplayMode<'_>) -> ReplayResult<ReplayOutcome> {
        if self.store.exists() {
            let target = match self.store.load() {
                Ok(Some(state)) => state.target.to_string(),
                _ => "<unknown>".to_string(),
            };
            return Err(ReplayError::ReplayInProgress { target });
        }
        self.repo.ensure_clean()?;

        let tip = self.repo.resolve_branch(target)?;
        let original_head = self.repo.current_branch()?;
        let mut state = ReplayState::new(target.clone(), original_head, tip, plan, self.labels.clone());

        if let ReplayMode::Interactive(editor) = mode {
            let text = state.plan.to_text();
            match editor.edit(&text)? {
                HookOutcome::Edited(edited) if ReplayPlan::has_instructions(&edited) => {
                    state.plan = ReplayPlan::parse_edited(&edited, &state.plan)?;
                }
                _ => {
                    info!(session = %state.session, "sequence editor aborted the replay");
                    state.status = ReplayStatus::Aborted;
                    return Ok(ReplayOutcome::Aborted(self.handle(state)));
                }
            }
        }
        state.plan.validate(&self.graph)?;

        state.skipped = self.already_applied(&state.plan, tip)?;
        let remaining: Vec<&PlanEntry> = state
            .plan
            .applied()
            .filter(|e| !state.skipped.contains(&e.commit))
            .collect();
        if remaining.is_empty() {
            return Err(ReplayError::NothingToReplay);
        }
        if remaining[0].action == ReplayAction::Squash {
            let first = remaining[0].commit;
            warn!(commit = %first, "nothing left to squash into, picking instead");
            state.plan.set_action(first, ReplayAction::Keep)?;
        }

        info!(
            session = %state.session,
            target = %target,
            entries = state.plan.len(),
            skipped = state.skipped.len(),
            "starting replay"
        );
        state.status = ReplayStatus::Applying;
        self.store.save(&state)?;
        if let Err(e) = self.repo.checkout_branch(target) {
            if let Err(cleanup) = self.store.clear() {
                warn!(error = %cleanup, "failed to remove replay state");
            }
            return Err(e.into());
        }

        drive(self.repo.clone(), self.store.clone(), state)
    }

    /// Reload a halted replay. A replay interrupted between entries comes
    /// back as stopped, reset to its last applied commit.
    pub fn in_progress(&self) -> ReplayResult<Option<ReplayOutcome>> {
        let mut state = match self.store.load()? {
            Some(state) => state,
            None => return Ok(None),
        };

        let outcome = match state.status {
            ReplayStatus::Conflicted => ReplayOutcome::Conflicted(self.handle(state)),
            ReplayStatus::Stopped => ReplayOutcome::Stopped(self.handle(state)),
            status => {
                warn!(session = %state.session, ?status, "replay was interrupted, resetting to its last applied commit");
                self.repo.reset_branch_hard(&state.target, state.current_tip)?;
                state.status = ReplayStatus::Stopped;
                state.halted_at = None;
                self.store.save(&state)?;
                ReplayOutcome::Stopped(self.handle(state))
            }
        };
        Ok(Some(outcome))
    }

    /// Continue whatever replay is halted.
    pub fn resume(&self) -> ReplayResult<ReplayOutcome> {
        match self.in_progress()? {
            Some(ReplayOutcome::Conflicted(replay)) => replay.resume(),
            Some(ReplayOutcome::Stopped(replay)) => replay.resume(),
            // in_progress only reports halted replays
            _ => Err(ReplayError::NoReplayInProgress),
        }
    }

    /// Abort whatever replay is halted.
    pub fn abort(&self) -> ReplayResult<Replay<Aborted>> {
        match self.in_progress()? {
            Some(ReplayOutcome::Conflicted(replay)) => replay.abort(),
            Some(ReplayOutcome::Stopped(replay)) => replay.abort(),
            _ => Err(ReplayError::NoReplayInProgress),
        }
    }

    fn handle<S>(&self, state: ReplayState) -> Replay<S> {
        Replay::from_state(self.repo.clone(), self.store.clone(), state)
    }

    /// Applied entries whose change the target already has: the commit is
    /// reachable from it, or a commit with the same patch id was added to
    /// it since the merge base.
    fn already_applied(&self, plan: &ReplayPlan, tip: CommitId) -> ReplayResult<Vec<CommitId>> {
        let mut skipped = Vec::new();
        let mut pending = Vec::new();
        let mut bases = Vec::new();

        for entry in plan.applied() {
            if self.graph.is_ancestor(entry.commit, tip)? {
                debug!(commit = %entry.commit, "already reachable from the target");
                skipped.push(entry.commit);
                continue;
            }
            if let Some(base) = self.graph.merge_base(entry.commit, tip)? {
                if !bases.contains(&base) {
                    bases.push(base);
                }
            }
            pending.push(entry.commit);
        }
        if pending.is_empty() {
            return Ok(skipped);
        }

        let mut on_target = HashSet::new();
        for commit in self.repo.history(tip, &bases)? {
            if let Some(patch) = self.repo.patch_id(commit.id)? {
                on_target.insert(patch);
            }
        }
        for commit in pending {
            if let Some(patch) = self.repo.patch_id(commit)? {
                if on_target.contains(&patch) {
                    warn!(commit = %commit, "change is already on the target, skipping");
                    skipped.push(commit);
                }
            }
        }
        Ok(skipped)
    }
}

/// Work through the plan from `state.next` until done or halted.
fn drive(repo: GitRepository, store: StateStore, mut state: ReplayState) -> ReplayResult<ReplayOutcome> {
    state.status = ReplayStatus::Applying;

    while state.next < state.plan.len() {
        let index = state.next;
        let entry = state.plan.entries()[index].clone();
        if !entry.action.applies() || state.skipped.contains(&entry.commit) {
            state.next += 1;
            continue;
        }

        debug!(commit = %entry.commit, action = %entry.action, "applying");
        match repo.cherry_pick(entry.commit)? {
            CherryPickResult::Conflicted(paths) => {
                info!(commit = %entry.commit, conflicts = paths.len(), "replay halted on conflict");
                state.status = ReplayStatus::Conflicted;
                state.conflicts = paths;
                state.halted_at = Some(index);
                store.save(&state)?;
                return Ok(ReplayOutcome::Conflicted(Replay::from_state(repo, store, state)));
            }
            CherryPickResult::Clean(tree) => {
                record(&repo, &mut state, &entry, tree)?;
                state.next += 1;
                if entry.action == ReplayAction::Edit {
                    return stop(repo, store, state, index);
                }
                store.save(&state)?;
            }
        }
    }

    repo.cleanup_state()?;
    store.clear()?;
    state.status = ReplayStatus::Completed;
    info!(session = %state.session, applied = state.applied.len(), tip = %state.current_tip, "replay completed");
    Ok(ReplayOutcome::Completed(Replay::from_state(repo, store, state)))
}

fn stop(repo: GitRepository, store: StateStore, mut state: ReplayState, index: usize) -> ReplayResult<ReplayOutcome> {
    state.status = ReplayStatus::Stopped;
    state.halted_at = Some(index);
    store.save(&state)?;
    info!(session = %state.session, tip = %state.current_tip, "replay stopped for editing");
    Ok(ReplayOutcome::Stopped(Replay::from_state(repo, store, state)))
}

/// Turn the applied `tree` into a commit for `entry` and move the target.
fn record(repo: &GitRepository, state: &mut ReplayState, entry: &PlanEntry, tree: TreeId) -> ReplayResult<()> {
    let tip_tree = repo.tree_at(state.current_tip)?.tree_id;
    if tree == tip_tree {
        warn!(commit = %entry.commit, "change is already on the target, skipping");
        state.skipped.push(entry.commit);
        repo.cleanup_state()?;
        return Ok(());
    }

    let original = repo.get_commit(entry.commit)?;
    let replayed = if entry.action == ReplayAction::Squash && !state.applied.is_empty() {
        let previous = repo.get_commit(state.current_tip)?;
        let parent = previous
            .first_parent()
            .ok_or_else(|| StorageError::Internal(format!("cannot squash into root commit {}", previous.id)))?;
        let message = CommitMessage::squash(&previous.message, &original.message);
        let id = repo.replay_commit(previous.id, tree, parent, &message)?;
        if let Some(last) = state.applied.last_mut() {
            last.replayed = id;
            last.folded.push(entry.commit);
        }
        id
    } else {
        let message = match &entry.new_subject {
            Some(subject) => CommitMessage::reword(&original.message, subject),
            None => original.message.clone(),
        };
        let id = repo.replay_commit(entry.commit, tree, state.current_tip, &message)?;
        state.applied.push(AppliedCommit {
            original: entry.commit,
            replayed: id,
            folded: Vec::new(),
        });
        id
    };

    repo.update_branch_if_unchanged(&state.target, state.current_tip, replayed)?;
    repo.cleanup_state()?;
    debug!(original = %entry.commit, replayed = %replayed, "recorded");
    state.current_tip = replayed;
    Ok(())
}

fn abort_replay(repo: GitRepository, store: StateStore, mut state: ReplayState) -> ReplayResult<Replay<Aborted>> {
    repo.reset_branch_hard(&state.target, state.original_tip)?;
    if let Some(head) = &state.original_head {
        if head != &state.target {
            repo.checkout_branch(head)?;
        }
    }
    store.clear()?;
    state.status = ReplayStatus::Aborted;
    state.current_tip = state.original_tip;
    info!(session = %state.session, target = %state.target, "replay aborted");
    Ok(Replay::from_state(repo, store, state))
}
