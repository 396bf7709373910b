//! The sequence editor hook.
//!
//! Interactive replays hand the serialized plan to a [`SequenceEditor`]
//! before anything is applied. The command-line surface uses
//! [`CommandEditor`], which runs an external program on a temp file the
//! same way `git rebase -i` runs `GIT_SEQUENCE_EDITOR`; tests use closures.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::replay::error::{ReplayError, ReplayResult};
use crate::replay::plan::ReplayPlan;

/// What the editor decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// the (possibly unchanged) plan text
    Edited(String),
    /// stop without applying anything
    Abort,
}

/// Edits the serialized plan. Blocks until the edit is done.
pub trait SequenceEditor {
    fn edit(&self, plan: &str) -> ReplayResult<HookOutcome>;
}

impl<F> SequenceEditor for F
where
    F: Fn(&str) -> ReplayResult<HookOutcome>,
{
    fn edit(&self, plan: &str) -> ReplayResult<HookOutcome> {
        self(plan)
    }
}

/// Runs a shell command on a temp file holding the plan.
#[derive(Debug, Clone)]
pub struct CommandEditor {
    command: String,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandEditor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    /// Run the command from `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an extra environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl SequenceEditor for CommandEditor {
    fn edit(&self, plan: &str) -> ReplayResult<HookOutcome> {
        let mut file = tempfile::Builder::new()
            .prefix("git-upstream-todo-")
            .tempfile()?;
        file.write_all(plan.as_bytes())?;
        file.flush()?;

        // same invocation git uses, so editor commands may carry arguments
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("{} \"$@\"", self.command))
            .arg(&self.command)
            .arg(file.path());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        info!(command = %self.command, "running sequence editor");
        let status = command.status()?;
        if !status.success() {
            return Err(ReplayError::HookFailed {
                command: self.command.clone(),
                status: status.code(),
            });
        }

        let edited = fs::read_to_string(file.path())?;
        if !ReplayPlan::has_instructions(&edited) {
            debug!("sequence editor left no instructions");
            return Ok(HookOutcome::Abort);
        }
        Ok(HookOutcome::Edited(edited))
    }
}
