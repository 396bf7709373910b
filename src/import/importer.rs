//! The import command.

use tracing::{info, warn};

use crate::graph::{CommitGraph, RangeResolver};
use crate::import::config::{resolve_sequence_editor, ImportConfig, ImportMode, DEFAULT_EDITOR};
use crate::import::error::{ImportError, ImportResult};
use crate::replay::{
    CommandEditor, Completed, Replay, ReplayEngine, ReplayError, ReplayMode, ReplayOutcome, ReplayPlan,
};
use crate::storage::{BranchName, CommitId, CommitMessage, GitRepository, StorageError};

const LABEL_HEAD: &str = "head";
const LABEL_UPSTREAM: &str = "upstream";
const LABEL_CREATED: &str = "import-branch-created";
const LABEL_NO_MERGE: &str = "no-merge";

/// What an import did.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Nothing on `upstream` is missing from `head`.
    UpToDate,
    /// Dry run: what would be replayed, and where.
    Planned { import_branch: BranchName, plan: ReplayPlan },
    Imported(ImportSummary),
}

/// The result of a completed import.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub head: BranchName,
    pub import_branch: BranchName,
    /// new commits on the import branch, oldest first
    pub replayed: Vec<CommitId>,
    /// commits whose change upstream already had
    pub skipped: Vec<CommitId>,
    /// the superseding merge recorded on `head`
    pub merge: Option<CommitId>,
}

/// Replays local changes onto upstream and records the result on the head
/// branch.
pub struct Importer {
    repo: GitRepository,
    graph: CommitGraph,
    config: ImportConfig,
}

impl Importer {
    pub fn new(repo: GitRepository, config: ImportConfig) -> Self {
        Self {
            graph: CommitGraph::new(repo.clone()),
            repo,
            config,
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repo
    }

    /// Import `upstream` into `head` (the current branch when `None`).
    pub fn import(&self, upstream: &str, head: Option<&str>) -> ImportResult<ImportOutcome> {
        let head = match head {
            Some(name) => BranchName::new(name).map_err(StorageError::from)?,
            None => self.repo.current_branch()?.ok_or(StorageError::DetachedHead)?,
        };
        let head_tip = self.repo.resolve_branch(&head)?;
        let upstream_tip = self.graph.resolve(upstream)?;
        let merge_base = match &self.config.merge_base {
            Some(rev) => Some(self.graph.resolve(rev)?),
            None => None,
        };

        let range = RangeResolver::new(self.graph.clone()).resolve(upstream_tip, head_tip, merge_base)?;
        if range.is_empty() || self.graph.is_ancestor(upstream_tip, head_tip)? {
            info!(upstream = %upstream, head = %head, "already up to date");
            return Ok(ImportOutcome::UpToDate);
        }

        let import_branch = match &self.config.import_branch {
            Some(name) => BranchName::new(name.as_str()).map_err(StorageError::from)?,
            None => BranchName::for_import(upstream, upstream_tip),
        };
        let plan = ReplayPlan::from_range(&range);

        if self.config.dry_run {
            info!(import_branch = %import_branch, commits = plan.len(), "dry run");
            return Ok(ImportOutcome::Planned { import_branch, plan });
        }

        let engine = ReplayEngine::new(self.repo.clone());
        if engine.is_in_progress() {
            return Err(ReplayError::ReplayInProgress {
                target: import_branch.to_string(),
            }
            .into());
        }
        self.repo.ensure_clean()?;
        let created = self.prepare_branch(&import_branch, upstream_tip)?;

        info!(
            upstream = %upstream,
            head = %head,
            import_branch = %import_branch,
            commits = range.len(),
            "importing"
        );
        let engine = engine
            .with_label(LABEL_HEAD, head.as_str())
            .with_label(LABEL_UPSTREAM, upstream)
            .with_label(LABEL_CREATED, created.to_string())
            .with_label(LABEL_NO_MERGE, self.config.no_merge.to_string());

        let outcome = match self.begin(&engine, plan, &import_branch) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_branch(&import_branch, created);
                return Err(e);
            }
        };
        if let ReplayOutcome::Aborted(_) = outcome {
            self.discard_branch(&import_branch, created);
            return Err(ReplayError::Aborted.into());
        }
        self.finish(outcome.into_completed()?)
    }

    /// Continue a halted import.
    pub fn resume(&self) -> ImportResult<ImportOutcome> {
        let engine = ReplayEngine::new(self.repo.clone());
        let completed = engine.resume()?.into_completed()?;
        self.finish(completed)
    }

    /// Abandon a halted import: the head branch and worktree are restored and
    /// a branch created for the import is removed.
    pub fn abort(&self) -> ImportResult<()> {
        let engine = ReplayEngine::new(self.repo.clone());
        let aborted = engine.abort()?;
        let created = aborted.label(LABEL_CREATED) == Some("true");
        self.discard_branch(aborted.target(), created);
        Ok(())
    }

    fn begin(&self, engine: &ReplayEngine, plan: ReplayPlan, target: &BranchName) -> ImportResult<ReplayOutcome> {
        match self.config.mode {
            ImportMode::Automated => Ok(engine.begin(plan, target, ReplayMode::Automated)?),
            ImportMode::Interactive => {
                let command = resolve_sequence_editor(&self.repo, self.config.sequence_editor.as_deref(), |_| None)?
                    .unwrap_or_else(|| DEFAULT_EDITOR.to_string());
                let editor = CommandEditor::new(command).current_dir(self.repo.workdir()?);
                Ok(engine.begin(plan, target, ReplayMode::Interactive(&editor))?)
            }
        }
    }

    /// Create the import branch at `upstream`. An existing branch is reused
    /// only when it already points there.
    fn prepare_branch(&self, branch: &BranchName, upstream: CommitId) -> ImportResult<bool> {
        if self.repo.branch_exists(branch)? {
            let tip = self.repo.resolve_branch(branch)?;
            if tip != upstream {
                return Err(StorageError::BranchAlreadyExists(branch.to_string()).into());
            }
            return Ok(false);
        }
        self.repo.create_branch(branch, upstream)?;
        Ok(true)
    }

    fn discard_branch(&self, branch: &BranchName, created: bool) {
        if !created {
            return;
        }
        if let Err(e) = self.repo.delete_branch(branch) {
            warn!(branch = %branch, error = %e, "failed to remove import branch");
        }
    }

    /// Record the superseding merge on the head branch.
    fn finish(&self, replay: Replay<Completed>) -> ImportResult<ImportOutcome> {
        let head = replay
            .label(LABEL_HEAD)
            .ok_or_else(|| StorageError::Internal("replay state has no head branch".to_string()))?;
        let head = BranchName::new(head).map_err(StorageError::from)?;
        let import_branch = replay.target().clone();

        let no_merge = self.config.no_merge || replay.label(LABEL_NO_MERGE) == Some("true");
        let merge = if no_merge {
            None
        } else {
            let head_tip = self.repo.resolve_branch(&head)?;
            let import_tip = replay.tip();
            let tree = self.repo.tree_at(import_tip)?.tree_id;
            let message = CommitMessage::import_merge(import_branch.as_str(), head.as_str());
            let merge = self.repo.commit_tree(tree, vec![head_tip, import_tip], &message)?;
            self.repo.update_branch_if_unchanged(&head, head_tip, merge)?;
            self.repo.checkout_branch(&head)?;
            info!(head = %head, merge = %merge, "recorded import merge");
            Some(merge)
        };

        Ok(ImportOutcome::Imported(ImportSummary {
            head,
            import_branch,
            replayed: replay.new_commits(),
            skipped: replay.skipped().to_vec(),
            merge,
        }))
    }
}
