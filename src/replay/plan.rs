//! Replay plans and their text exchange format.
//!
//! A plan is the ordered list of `{commit, action}` entries the engine
//! works through. It is handed to the sequence editor as text, one entry
//! per line:
//!
//! ```text
//! pick 1a2b3c4 Add the frobnicator
//! reword 5d6e7f8 Fix typo in frobnicator docs
//! drop 9a0b1c2 WIP
//! ```
//!
//! and read back with [`ReplayPlan::parse_edited`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{CommitGraph, CommitRange};
use crate::replay::error::{ReplayError, ReplayResult};
use crate::storage::CommitId;

/// Shortest abbreviation used when serializing a plan.
const MIN_ABBREV: usize = 7;

const HELP: &str = "\
# Commands:
#  p, pick <commit> = use commit
#  r, reword <commit> <subject> = use commit, replacing its subject line
#  e, edit <commit> = use commit, but stop for amending
#  s, squash <commit> = use commit, but meld into previous commit
#  d, drop <commit> = remove commit
#
# These lines can be re-ordered; they are executed from top to bottom.
#
# If you remove a line here THAT COMMIT WILL BE LOST.
#
# However, if you remove everything, the replay will be aborted.
";

/// What to do with one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayAction {
    Keep,
    Drop,
    Edit,
    Reword,
    Squash,
}

impl ReplayAction {
    /// The command word used in the text format.
    pub fn command(&self) -> &'static str {
        match self {
            ReplayAction::Keep => "pick",
            ReplayAction::Drop => "drop",
            ReplayAction::Edit => "edit",
            ReplayAction::Reword => "reword",
            ReplayAction::Squash => "squash",
        }
    }

    /// Parse a command word or its one-letter abbreviation.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "pick" | "p" => Some(ReplayAction::Keep),
            "drop" | "d" => Some(ReplayAction::Drop),
            "edit" | "e" => Some(ReplayAction::Edit),
            "reword" | "r" => Some(ReplayAction::Reword),
            "squash" | "s" => Some(ReplayAction::Squash),
            _ => None,
        }
    }

    /// Whether the entry produces (or contributes to) a new commit.
    pub fn applies(&self) -> bool {
        !matches!(self, ReplayAction::Drop)
    }
}

impl fmt::Display for ReplayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub commit: CommitId,
    pub action: ReplayAction,
    /// subject of the original commit
    pub subject: String,
    /// replacement subject for `reword`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_subject: Option<String>,
}

impl PlanEntry {
    pub fn keep(commit: CommitId, subject: impl Into<String>) -> Self {
        Self {
            commit,
            action: ReplayAction::Keep,
            subject: subject.into(),
            new_subject: None,
        }
    }

    fn render(&self, abbrev: usize) -> String {
        let id = &self.commit.to_string()[..abbrev];
        let text = self.new_subject.as_deref().unwrap_or(&self.subject);
        format!("{} {} {}", self.action, id, text)
    }
}

/// An ordered list of replay steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayPlan {
    entries: Vec<PlanEntry>,
}

impl ReplayPlan {
    /// Every commit of the range, kept, in range order.
    pub fn from_range(range: &CommitRange) -> Self {
        Self {
            entries: range
                .iter()
                .map(|commit| PlanEntry::keep(commit.id, commit.subject()))
                .collect(),
        }
    }

    pub fn from_entries(entries: Vec<PlanEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that will produce or amend a commit.
    pub fn applied(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action.applies())
    }

    fn entry_mut(&mut self, commit: CommitId) -> ReplayResult<&mut PlanEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.commit == commit)
            .ok_or_else(|| ReplayError::violation(commit.short(), "commit is not part of the plan"))
    }

    /// Change the action of one entry.
    pub fn set_action(&mut self, commit: CommitId, action: ReplayAction) -> ReplayResult<()> {
        self.entry_mut(commit)?.action = action;
        Ok(())
    }

    /// Mark one entry as `reword` with a new subject line.
    pub fn reword(&mut self, commit: CommitId, subject: impl Into<String>) -> ReplayResult<()> {
        let entry = self.entry_mut(commit)?;
        entry.action = ReplayAction::Reword;
        entry.new_subject = Some(subject.into());
        Ok(())
    }

    /// Rearrange the named entries among the positions they occupy; the
    /// others stay where they are.
    pub fn reorder(&mut self, order: &[CommitId]) -> ReplayResult<()> {
        let mut positions = Vec::with_capacity(order.len());
        for commit in order {
            let position = self
                .entries
                .iter()
                .position(|e| e.commit == *commit)
                .ok_or_else(|| ReplayError::violation(commit.short(), "commit is not part of the plan"))?;
            if positions.contains(&position) {
                return Err(ReplayError::violation(commit.short(), "commit listed more than once"));
            }
            positions.push(position);
        }

        let moved: Vec<PlanEntry> = positions.iter().map(|p| self.entries[*p].clone()).collect();
        positions.sort_unstable();
        for (slot, entry) in positions.into_iter().zip(moved) {
            self.entries[slot] = entry;
        }
        Ok(())
    }

    /// Smallest abbreviation length that keeps every id in the plan unique.
    fn abbrev_len(&self) -> usize {
        let mut len = MIN_ABBREV;
        while len < 40 {
            let mut seen = HashSet::new();
            let unique = self
                .entries
                .iter()
                .all(|e| seen.insert(e.commit.to_string()[..len].to_string()));
            if unique {
                break;
            }
            len += 1;
        }
        len
    }

    /// The text handed to the sequence editor.
    pub fn to_text(&self) -> String {
        let abbrev = self.abbrev_len();
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.render(abbrev));
            text.push('\n');
        }
        text.push('\n');
        text.push_str(&format!(
            "# Replay {} commit{}\n#\n",
            self.entries.len(),
            if self.entries.len() == 1 { "" } else { "s" }
        ));
        text.push_str(HELP);
        text
    }

    /// Whether `text` still holds at least one instruction line.
    pub fn has_instructions(text: &str) -> bool {
        text.lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with('#'))
    }

    /// Read back an edited plan. Ids resolve by unique prefix against
    /// `original` only; commits missing from the text are dropped.
    pub fn parse_edited(text: &str, original: &ReplayPlan) -> ReplayResult<ReplayPlan> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (word, rest) = split_word(line);
            let action =
                ReplayAction::parse(word).ok_or_else(|| ReplayError::violation(line, format!("unknown command `{}`", word)))?;
            let (id, text) = split_word(rest);
            if id.is_empty() {
                return Err(ReplayError::violation(line, "missing commit id"));
            }

            let mut candidates = original.entries.iter().filter(|e| e.commit.matches_prefix(id));
            let source = match (candidates.next(), candidates.next()) {
                (Some(entry), None) => entry,
                (None, _) => return Err(ReplayError::violation(line, format!("unknown commit `{}`", id))),
                (Some(_), Some(_)) => return Err(ReplayError::violation(line, format!("ambiguous commit id `{}`", id))),
            };
            if !seen.insert(source.commit) {
                return Err(ReplayError::violation(line, "commit listed more than once"));
            }

            let new_subject = match action {
                ReplayAction::Reword if !text.is_empty() && text != source.subject => Some(text.to_string()),
                ReplayAction::Reword => source.new_subject.clone(),
                _ => None,
            };
            entries.push(PlanEntry {
                commit: source.commit,
                action,
                subject: source.subject.clone(),
                new_subject,
            });
        }

        for entry in &original.entries {
            if !seen.contains(&entry.commit) {
                entries.push(PlanEntry {
                    action: ReplayAction::Drop,
                    new_subject: None,
                    ..entry.clone()
                });
            }
        }

        Ok(ReplayPlan { entries })
    }

    /// Check that the plan can be applied in order: no applied entry before
    /// one of its own ancestors, and every `squash` has something to fold into.
    pub fn validate(&self, graph: &CommitGraph) -> ReplayResult<()> {
        let abbrev = self.abbrev_len();
        let applied: Vec<&PlanEntry> = self.applied().collect();

        for (index, entry) in applied.iter().enumerate() {
            if entry.action == ReplayAction::Squash && index == 0 {
                return Err(ReplayError::violation(
                    entry.render(abbrev),
                    "cannot squash without a previous commit",
                ));
            }
            for later in &applied[index + 1..] {
                if graph.is_ancestor(later.commit, entry.commit)? {
                    return Err(ReplayError::violation(
                        entry.render(abbrev),
                        format!("placed before its ancestor {}", later.commit.short()),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ReplayPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// split off the first whitespace-delimited word
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], s[end..].trim()),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;
    use pretty_assertions::assert_eq;

    fn id(hex: &str) -> CommitId {
        CommitId::from_hex(hex).unwrap()
    }

    fn sample() -> ReplayPlan {
        ReplayPlan::from_entries(vec![
            PlanEntry::keep(id("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d"), "Add D"),
            PlanEntry::keep(id("5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f80"), "Add E"),
            PlanEntry::keep(id("9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b"), "Add F"),
        ])
    }

    #[test]
    fn test_to_text() {
        let text = sample().to_text();
        let lines: Vec<&str> = text.lines().take(4).collect();
        assert_eq!(
            lines,
            vec!["pick 1a2b3c4 Add D", "pick 5d6e7f8 Add E", "pick 9a0b1c2 Add F", ""]
        );
        assert!(text.contains("# Replay 3 commits"));
        assert!(text.contains("#  s, squash <commit>"));
    }

    #[test]
    fn test_abbrev_grows_until_unique() {
        let plan = ReplayPlan::from_entries(vec![
            PlanEntry::keep(id("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d"), "One"),
            PlanEntry::keep(id("1a2b3c4d00000000000000000000000000000000"), "Two"),
        ]);
        let text = plan.to_text();
        assert!(text.starts_with("pick 1a2b3c4d5 One\npick 1a2b3c4d0 Two\n"));
    }

    #[test]
    fn test_parse_unchanged_roundtrip() {
        let plan = sample();
        let parsed = ReplayPlan::parse_edited(&plan.to_text(), &plan).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_parse_edits() {
        let plan = sample();
        let text = "\
# a comment
r 5d6e7f8 Better subject for E
   p   1a2b3c

squash 9a0b1c2d Add F
";
        let parsed = ReplayPlan::parse_edited(text, &plan).unwrap();
        let actions: Vec<(ReplayAction, &str)> = parsed
            .entries()
            .iter()
            .map(|e| (e.action, e.subject.as_str()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (ReplayAction::Reword, "Add E"),
                (ReplayAction::Keep, "Add D"),
                (ReplayAction::Squash, "Add F"),
            ]
        );
        assert_eq!(parsed.entries()[0].new_subject.as_deref(), Some("Better subject for E"));
    }

    #[test]
    fn test_removed_lines_are_dropped() {
        let plan = sample();
        let parsed = ReplayPlan::parse_edited("pick 9a0b1c2 Add F\n", &plan).unwrap();
        let actions: Vec<ReplayAction> = parsed.entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![ReplayAction::Keep, ReplayAction::Drop, ReplayAction::Drop]);
        assert_eq!(parsed.applied().count(), 1);
    }

    #[test]
    fn test_parse_violations() {
        let plan = sample();
        let cases = [
            ("fixup 1a2b3c4 Add D", "unknown command `fixup`"),
            ("pick", "missing commit id"),
            ("pick deadbee Add D", "unknown commit `deadbee`"),
            ("pick 1a2b3c4\npick 1a2b Add D again", "commit listed more than once"),
        ];
        for (text, reason) in cases {
            match ReplayPlan::parse_edited(text, &plan) {
                Err(ReplayError::PlanViolation { reason: actual, .. }) => assert_eq!(actual, reason),
                other => panic!("expected violation for {:?}, got {:?}", text, other),
            }
        }

        let ambiguous = ReplayPlan::from_entries(vec![
            PlanEntry::keep(id("1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4d"), "One"),
            PlanEntry::keep(id("1a2b3c4d00000000000000000000000000000000"), "Two"),
        ]);
        match ReplayPlan::parse_edited("pick 1a2b3c4 One", &ambiguous) {
            Err(ReplayError::PlanViolation { action, reason }) => {
                assert_eq!(action, "pick 1a2b3c4 One");
                assert_eq!(reason, "ambiguous commit id `1a2b3c4`");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_has_instructions() {
        assert!(ReplayPlan::has_instructions("pick 1a2b3c4 x\n"));
        assert!(!ReplayPlan::has_instructions("\n# pick 1a2b3c4 x\n   \n"));
        assert!(!ReplayPlan::has_instructions(""));
    }

    #[test]
    fn test_reorder_and_reword() {
        let mut plan = sample();
        let ids: Vec<CommitId> = plan.entries().iter().map(|e| e.commit).collect();
        plan.reorder(&[ids[2], ids[0]]).unwrap();
        let order: Vec<CommitId> = plan.entries().iter().map(|e| e.commit).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

        plan.reword(ids[1], "Renamed").unwrap();
        assert!(plan.to_text().contains("reword 5d6e7f8 Renamed"));
        assert!(plan.reorder(&[ids[0], ids[0]]).is_err());
        assert!(plan.set_action(id("deadbeef00000000000000000000000000000000"), ReplayAction::Drop).is_err());
    }

    #[test]
    fn test_validate_ordering() {
        let t = TestRepo::new();
        let a = t.commit("A", &[]);
        let d = t.commit("D", &[a]);
        let e = t.commit("E", &[d]);
        let graph = CommitGraph::new(t.repo.clone());

        let in_order = ReplayPlan::from_entries(vec![PlanEntry::keep(d, "D"), PlanEntry::keep(e, "E")]);
        in_order.validate(&graph).unwrap();

        let reversed = ReplayPlan::from_entries(vec![PlanEntry::keep(e, "E"), PlanEntry::keep(d, "D")]);
        match reversed.validate(&graph) {
            Err(ReplayError::PlanViolation { action, reason }) => {
                assert_eq!(action, format!("pick {} E", e.short()));
                assert_eq!(reason, format!("placed before its ancestor {}", d.short()));
            }
            other => panic!("unexpected {:?}", other),
        }

        // dropping the ancestor makes the order irrelevant
        let mut dropped = reversed.clone();
        dropped.set_action(d, ReplayAction::Drop).unwrap();
        dropped.validate(&graph).unwrap();

        let mut squash_first = in_order.clone();
        squash_first.set_action(d, ReplayAction::Squash).unwrap();
        assert!(matches!(
            squash_first.validate(&graph),
            Err(ReplayError::PlanViolation { .. })
        ));
    }
}
