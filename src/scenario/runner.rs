//! Running the replay against a built scenario.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::graph::{CommitGraph, CommitRange, GraphError, RangeResolver};
use crate::replay::{HookOutcome, ReplayAction, ReplayEngine, ReplayError, ReplayMode, ReplayPlan, ReplayResult};
use crate::scenario::builder::ScenarioRepo;
use crate::scenario::description::{ExpectedError, ScenarioMode, HEAD_ROLE, UPSTREAM_ROLE};
use crate::scenario::error::{ScenarioError, ScenarioResult};
use crate::scenario::matcher::{assert_matches, ActualGraph};
use crate::storage::{BranchName, CommitId};

/// Default branch receiving a direct replay.
const DEFAULT_TARGET: &str = "import";

/// How the replay is driven.
#[derive(Debug, Clone)]
pub enum ReplayInvocation {
    /// The engine, in this process.
    Direct,
    /// A binary run inside the repository.
    Command {
        program: PathBuf,
        /// replaces the scenario's own `args` when not empty
        args: Vec<String>,
        env: Vec<(String, String)>,
    },
}

impl ReplayInvocation {
    pub fn command(program: impl Into<PathBuf>) -> Self {
        ReplayInvocation::Command {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Add an argument to a command invocation.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        if let ReplayInvocation::Command { args, .. } = &mut self {
            args.push(value.into());
        }
        self
    }

    /// Add an environment variable to a command invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ReplayInvocation::Command { env, .. } = &mut self {
            env.push((key.into(), value.into()));
        }
        self
    }
}

impl ExpectedError {
    /// Whether `error` is this failure.
    pub fn matches(&self, error: &ScenarioError) -> bool {
        if let Some(code) = error.exit_code() {
            return code == self.exit_code();
        }
        let replay = match error {
            ScenarioError::Replay(e) => Some(e),
            _ => None,
        };
        match self {
            ExpectedError::DivergentHistory => matches!(
                error,
                ScenarioError::Graph(GraphError::DivergentHistory { .. })
                    | ScenarioError::Replay(ReplayError::Graph(GraphError::DivergentHistory { .. }))
            ),
            ExpectedError::PlanViolation => matches!(replay, Some(ReplayError::PlanViolation { .. })),
            ExpectedError::NothingToReplay => matches!(replay, Some(ReplayError::NothingToReplay)),
            ExpectedError::Conflict => matches!(replay, Some(ReplayError::Conflict { .. })),
        }
    }
}

impl ScenarioRepo {
    /// `resolve(upstream, head)` on the scenario's branches.
    pub fn resolve_range(&self) -> ScenarioResult<ActualGraph> {
        let (upstream, upstream_tip) = self.branch(UPSTREAM_ROLE)?;
        let (head, head_tip) = self.branch(HEAD_ROLE)?;
        let merge_base = self.merge_base_override()?;
        let range = RangeResolver::new(self.graph()).resolve(upstream_tip, head_tip, merge_base)?;
        Ok(ActualGraph::new(format!("{}..{}", upstream, head), range))
    }

    /// Replay the scenario and read back the replayed commits.
    pub fn run(&self, invocation: &ReplayInvocation) -> ScenarioResult<ActualGraph> {
        match invocation {
            ReplayInvocation::Direct => self.run_direct(),
            ReplayInvocation::Command { program, args, env } => self.run_command(program, args, env),
        }
    }

    /// Build-run-compare against every expectation of the description.
    /// Failures carry [`ScenarioRepo::describe`] output.
    pub fn verify(&self, invocation: &ReplayInvocation) -> ScenarioResult<()> {
        let expect = &self.description().expect;
        let result = self.check_range().and_then(|_| self.run(invocation));

        let checked = match (expect.error, result) {
            (Some(expected), Err(e)) if expected.matches(&e) => {
                debug!(error = %e, "failed as expected");
                Ok(())
            }
            (Some(expected), Err(e)) => Err(ScenarioError::Mismatch(format!(
                "expected a {} failure, got: {}",
                expected, e
            ))),
            (Some(expected), Ok(actual)) => Err(ScenarioError::Mismatch(format!(
                "expected a {} failure, but the replay produced {} commits",
                expected,
                actual.len()
            ))),
            (None, Err(e)) => Err(e),
            (None, Ok(actual)) => match &expect.rebased {
                Some(nodes) => assert_matches(&self.commits_for(nodes)?, &actual),
                None => Ok(()),
            },
        };
        checked.map_err(|e| match e {
            ScenarioError::Mismatch(message) => ScenarioError::Mismatch(format!("{}\n\n{}", message, self.describe())),
            other => other,
        })
    }

    fn check_range(&self) -> ScenarioResult<()> {
        match &self.description().expect.range {
            Some(nodes) => {
                let actual = self.resolve_range()?;
                assert_matches(&self.commits_for(nodes)?, &actual)
            }
            None => Ok(()),
        }
    }

    fn merge_base_override(&self) -> ScenarioResult<Option<CommitId>> {
        match &self.description().replay.merge_base {
            Some(node) => Ok(Some(self.node(node)?)),
            None => Ok(None),
        }
    }

    fn run_direct(&self) -> ScenarioResult<ActualGraph> {
        let spec = &self.description().replay;
        let (upstream, upstream_tip) = self.branch(UPSTREAM_ROLE)?;
        let (_, head_tip) = self.branch(HEAD_ROLE)?;

        let target_name = spec.target.as_deref().unwrap_or(DEFAULT_TARGET);
        let target = BranchName::new(target_name).map_err(|e| ScenarioError::invalid(e.to_string()))?;
        if !self.repository().branch_exists(&target)? {
            self.repository().create_branch(&target, upstream_tip)?;
        }

        let graph = self.graph();
        let range = RangeResolver::new(graph.clone()).resolve(upstream_tip, head_tip, self.merge_base_override()?)?;
        let plan = ReplayPlan::from_range(&range);
        let engine = ReplayEngine::new(self.repository().clone());

        info!(target = %target, commits = plan.len(), mode = ?spec.mode, "running scenario replay");
        let outcome = match spec.mode {
            ScenarioMode::Automated => {
                let plan = self.apply_edits(plan)?;
                engine.begin(plan, &target, ReplayMode::Automated)?
            }
            ScenarioMode::Interactive => {
                let original = plan.clone();
                let editor = |text: &str| -> ReplayResult<HookOutcome> {
                    let edited = ReplayPlan::parse_edited(text, &original)?;
                    let edited = self.apply_edits(edited).map_err(|e| match e {
                        ScenarioError::Replay(e) => e,
                        other => ReplayError::violation("scenario edits", other.to_string()),
                    })?;
                    Ok(HookOutcome::Edited(edited.to_text()))
                };
                engine.begin(plan, &target, ReplayMode::Interactive(&editor))?
            }
        };
        let replay = outcome.into_completed()?;

        let commits = graph.load_range(upstream_tip, replay.tip())?;
        Ok(ActualGraph::new(format!("{}..{}", upstream, target), commits))
    }

    /// Apply the description's drop, reword, squash and order edits.
    fn apply_edits(&self, mut plan: ReplayPlan) -> ScenarioResult<ReplayPlan> {
        let spec = &self.description().replay;
        for node in &spec.drop {
            plan.set_action(self.node(node)?, ReplayAction::Drop)?;
        }
        for node in &spec.squash {
            plan.set_action(self.node(node)?, ReplayAction::Squash)?;
        }
        for (node, subject) in &spec.reword {
            plan.reword(self.node(node)?, subject.as_str())?;
        }
        if !spec.order.is_empty() {
            let order = spec
                .order
                .iter()
                .map(|node| self.node(node))
                .collect::<ScenarioResult<Vec<_>>>()?;
            plan.reorder(&order)?;
        }
        Ok(plan)
    }

    fn run_command(&self, program: &Path, args: &[String], env: &[(String, String)]) -> ScenarioResult<ActualGraph> {
        let args = if !args.is_empty() {
            args.to_vec()
        } else if !self.description().args.is_empty() {
            self.description().args.clone()
        } else {
            self.default_args()?
        };

        let mut command = Command::new(program);
        command
            .args(&args)
            .current_dir(self.path())
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        for (key, value) in env {
            command.env(key, value);
        }

        let rendered = format!("{} {}", program.display(), args.join(" "));
        info!(command = %rendered, "running scenario command");
        let output = command.output()?;
        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ScenarioError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                output: captured,
            });
        }

        let compared = match &self.description().expect.compare {
            Some(range) => range.clone(),
            None => {
                let (upstream, _) = self.branch(UPSTREAM_ROLE)?;
                let (head, _) = self.branch(HEAD_ROLE)?;
                format!("{}..{}^2", upstream, head)
            }
        };
        let commits = read_range(&self.graph(), &compared)?;
        Ok(ActualGraph::new(compared, commits))
    }

    /// `import [--interactive] <upstream> <head>`
    fn default_args(&self) -> ScenarioResult<Vec<String>> {
        let (upstream, _) = self.description().branch(UPSTREAM_ROLE)?;
        let (head, _) = self.description().branch(HEAD_ROLE)?;
        let mut args = vec!["import".to_string()];
        if self.description().replay.mode == ScenarioMode::Interactive {
            args.push("--interactive".to_string());
        }
        args.push(upstream.to_string());
        args.push(head.to_string());
        Ok(args)
    }
}

/// Read `from..to` through the graph model.
fn read_range(graph: &CommitGraph, range: &str) -> ScenarioResult<CommitRange> {
    let (from, to) = range
        .split_once("..")
        .ok_or_else(|| ScenarioError::invalid(format!("`{}` is not a revision range", range)))?;
    let from = graph.resolve(from)?;
    let to = graph.resolve(to)?;
    Ok(graph.load_range(from, to)?)
}
