//! Import configuration.

use tracing::debug;

use crate::storage::{GitRepository, StorageResult};

/// Editor used when nothing else is configured.
pub const DEFAULT_EDITOR: &str = "vi";

/// Whether the plan goes through the sequence editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Automated,
    Interactive,
}

/// Import configuration options.
#[derive(Debug, Clone, Default)]
pub struct ImportConfig {
    /// Automated or interactive replay.
    pub mode: ImportMode,
    /// Sequence editor command for interactive imports.
    pub sequence_editor: Option<String>,
    /// Revision used instead of the computed merge base.
    pub merge_base: Option<String>,
    /// Name of the branch receiving the replayed commits.
    pub import_branch: Option<String>,
    /// Skip the superseding merge onto the head branch.
    pub no_merge: bool,
    /// Compute and report the plan without touching the repository.
    pub dry_run: bool,
}

impl ImportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replay mode.
    pub fn mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for interactive mode.
    pub fn interactive(self, value: bool) -> Self {
        self.mode(if value { ImportMode::Interactive } else { ImportMode::Automated })
    }

    /// Set the sequence editor command.
    pub fn sequence_editor(mut self, command: impl Into<String>) -> Self {
        self.sequence_editor = Some(command.into());
        self
    }

    /// Set the merge base override.
    pub fn merge_base(mut self, rev: impl Into<String>) -> Self {
        self.merge_base = Some(rev.into());
        self
    }

    /// Set the import branch name.
    pub fn import_branch(mut self, name: impl Into<String>) -> Self {
        self.import_branch = Some(name.into());
        self
    }

    /// Set no_merge flag.
    pub fn no_merge(mut self, value: bool) -> Self {
        self.no_merge = value;
        self
    }

    /// Set dry_run flag.
    pub fn dry_run(mut self, value: bool) -> Self {
        self.dry_run = value;
        self
    }
}

/// Pick the sequence editor command the way git does: `explicit`, then
/// `GIT_SEQUENCE_EDITOR`, `sequence.editor`, `GIT_EDITOR`, `core.editor`.
/// Environment lookups go through `env` so callers decide whether the
/// process environment applies.
pub fn resolve_sequence_editor<F>(repo: &GitRepository, explicit: Option<&str>, env: F) -> StorageResult<Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let usable = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    if let Some(command) = usable(explicit.map(str::to_string)) {
        return Ok(Some(command));
    }
    if let Some(command) = usable(env("GIT_SEQUENCE_EDITOR")) {
        debug!(source = "GIT_SEQUENCE_EDITOR", "sequence editor resolved");
        return Ok(Some(command));
    }
    if let Some(command) = usable(repo.config_string("sequence.editor")?) {
        debug!(source = "sequence.editor", "sequence editor resolved");
        return Ok(Some(command));
    }
    if let Some(command) = usable(env("GIT_EDITOR")) {
        debug!(source = "GIT_EDITOR", "sequence editor resolved");
        return Ok(Some(command));
    }
    if let Some(command) = usable(repo.config_string("core.editor")?) {
        debug!(source = "core.editor", "sequence editor resolved");
        return Ok(Some(command));
    }
    Ok(None)
}
