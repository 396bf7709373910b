//! Range resolution: which commits does `head` carry that `upstream` lacks.
//!
//! The resolver excludes everything reachable from `upstream` (or from an
//! explicit merge base) and, when `head` already contains a previous import,
//! everything the newest superseding merge replaced. Merges themselves are
//! never part of a range; replaying linearizes them away like a rebase.

use tracing::{debug, info};

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::model::{CommitGraph, CommitRange};
use crate::storage::{CommitId, CommitInfo};

/// Computes commit ranges between two refs.
#[derive(Clone)]
pub struct RangeResolver {
    graph: CommitGraph,
}

impl RangeResolver {
    pub fn new(graph: CommitGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    /// The commits unique to `head` relative to `upstream`, oldest first.
    ///
    /// With `merge_base` given, that commit replaces `upstream` as the
    /// exclusion boundary and unrelated histories are accepted.
    pub fn resolve(
        &self,
        upstream: CommitId,
        head: CommitId,
        merge_base: Option<CommitId>,
    ) -> GraphResult<CommitRange> {
        if upstream == head {
            return Ok(CommitRange::empty());
        }

        let mut excluded = match merge_base {
            Some(base) => vec![base],
            None => {
                if self.graph.merge_base(upstream, head)?.is_none() {
                    return Err(GraphError::DivergentHistory {
                        upstream: self.graph.describe(upstream),
                        head: self.graph.describe(head),
                    });
                }
                vec![upstream]
            }
        };

        let mut boundaries = vec![upstream];
        boundaries.extend(merge_base);
        if let Some(merge) = self.newest_superseding_merge(head, &boundaries, &excluded)? {
            if let Some(mainline) = merge.first_parent() {
                debug!(merge = %merge.id, mainline = %mainline, "previous import found, excluding its mainline");
                excluded.push(mainline);
            }
        }

        let commits: Vec<CommitInfo> = self
            .graph
            .load_range_excluding(head, &excluded)?
            .into_vec()
            .into_iter()
            .filter(|commit| !commit.is_merge())
            .collect();

        info!(upstream = %upstream, head = %head, count = commits.len(), "resolved range");
        Ok(CommitRange::new(commits))
    }

    /// The commits `upstream` has that `head` lacks, oldest first.
    pub fn incoming(&self, upstream: CommitId, head: CommitId) -> GraphResult<CommitRange> {
        if upstream == head {
            return Ok(CommitRange::empty());
        }
        self.graph.load_range(head, upstream)
    }

    /// The newest merge on the first-parent chain of `head` that replaced
    /// its mainline: its tree is the tree of a non-mainline parent, and that
    /// parent is built on upstream history the mainline does not have.
    /// A `--no-ff` merge of a local branch has the same tree shape but no
    /// such upstream link.
    fn newest_superseding_merge(
        &self,
        head: CommitId,
        boundaries: &[CommitId],
        excluded: &[CommitId],
    ) -> GraphResult<Option<CommitInfo>> {
        for commit in self.graph.first_parent_chain(head, excluded)? {
            if !commit.is_merge() {
                continue;
            }
            let parents = self.graph.parents_of(commit.id)?;
            let mainline = match parents.first() {
                Some(parent) => parent.id,
                None => continue,
            };
            for side in parents.iter().skip(1).filter(|p| p.tree_id == commit.tree_id) {
                if self.brings_upstream(side.id, mainline, boundaries)? {
                    return Ok(Some(commit));
                }
            }
            debug!(merge = %commit.id, "merge keeps a side tree but carries no upstream history");
        }
        Ok(None)
    }

    /// Whether `side` shares history with one of `boundaries` that
    /// `mainline` lacks.
    fn brings_upstream(&self, side: CommitId, mainline: CommitId, boundaries: &[CommitId]) -> GraphResult<bool> {
        for boundary in boundaries {
            if let Some(base) = self.graph.merge_base(side, *boundary)? {
                if !self.graph.is_ancestor(base, mainline)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRepo;

    fn resolver(t: &TestRepo) -> RangeResolver {
        RangeResolver::new(CommitGraph::new(t.repo.clone()))
    }

    /// A<-B<-C upstream, A<-B<-D<-E head
    fn simple(t: &TestRepo) -> (CommitId, CommitId, CommitId, CommitId, CommitId) {
        let a = t.commit("A", &[]);
        let b = t.commit("B", &[a]);
        let c = t.commit("C", &[b]);
        let d = t.commit("D", &[b]);
        let e = t.commit("E", &[d]);
        t.branch("upstream", c);
        t.branch("master", e);
        (a, b, c, d, e)
    }

    #[test]
    fn test_resolve_simple() {
        let t = TestRepo::new();
        let (_, _, c, d, e) = simple(&t);
        let range = resolver(&t).resolve(c, e, None).unwrap();
        assert_eq!(range.ids(), vec![d, e]);
        assert_eq!(range.subjects(), vec!["D", "E"]);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let t = TestRepo::new();
        let (_, _, c, _, e) = simple(&t);
        let r = resolver(&t);
        assert_eq!(r.resolve(c, e, None).unwrap(), r.resolve(c, e, None).unwrap());
    }

    #[test]
    fn test_resolve_empty_cases() {
        let t = TestRepo::new();
        let (_, b, c, _, _) = simple(&t);
        let r = resolver(&t);
        assert!(r.resolve(c, c, None).unwrap().is_empty());
        // head is an ancestor of upstream
        assert!(r.resolve(c, b, None).unwrap().is_empty());
    }

    #[test]
    fn test_divergent_history() {
        let t = TestRepo::new();
        let a = t.commit("A", &[]);
        let x = t.commit("X", &[]);
        let y = t.commit("Y", &[x]);
        t.branch("upstream", a);
        t.branch("master", y);

        let err = resolver(&t).resolve(a, y, None).unwrap_err();
        match err {
            GraphError::DivergentHistory { upstream, head } => {
                assert_eq!(upstream, "upstream");
                assert_eq!(head, "master");
            }
            other => panic!("unexpected {:?}", other),
        }

        // an explicit base makes the walk bounded again
        let range = resolver(&t).resolve(a, y, Some(x)).unwrap();
        assert_eq!(range.ids(), vec![y]);
    }

    #[test]
    fn test_merge_base_override_replaces_upstream() {
        let t = TestRepo::new();
        let (a, b, c, d, e) = simple(&t);
        let range = resolver(&t).resolve(c, e, Some(a)).unwrap();
        assert_eq!(range.ids(), vec![b, d, e]);
    }

    #[test]
    fn test_upstream_merged_into_head_is_excluded() {
        let t = TestRepo::new();
        let (_, _, c, d, e) = simple(&t);
        let m = t.commit("Merge upstream", &[e, c]);
        let f = t.commit("F", &[m]);
        let g = t.commit("G", &[c]);

        let range = resolver(&t).resolve(g, f, None).unwrap();
        assert_eq!(range.ids(), vec![d, e, f]);
    }

    #[test]
    fn test_previous_import_is_superseded() {
        let t = TestRepo::new();
        let (_, _, c, _, e) = simple(&t);
        // previous import: D and E replayed on C, then merged over master
        let d1 = t.commit_file("D", &[c], "d.txt", "D\n");
        let e1 = t.commit_file("E", &[d1], "e.txt", "E\n");
        let m = t.merge_taking("Merge import", &[e, e1], 1);
        let f = t.commit("F", &[m]);
        // upstream moves on
        let g = t.commit("G", &[c]);

        let range = resolver(&t).resolve(g, f, None).unwrap();
        assert_eq!(range.ids(), vec![d1, e1, f]);
        assert_eq!(range.subjects(), vec!["D", "E", "F"]);
    }

    #[test]
    fn test_newest_superseding_merge_wins() {
        let t = TestRepo::new();
        let (_, _, c, _, e) = simple(&t);
        let e1 = t.commit_file("E", &[c], "e.txt", "E\n");
        let m1 = t.merge_taking("Merge import 1", &[e, e1], 1);
        let g = t.commit("G", &[c]);
        let e2 = t.commit_file("E", &[g], "e.txt", "E\n");
        let m2 = t.merge_taking("Merge import 2", &[m1, e2], 1);
        let h = t.commit("H", &[g]);

        let range = resolver(&t).resolve(h, m2, None).unwrap();
        assert_eq!(range.ids(), vec![e2]);
    }

    #[test]
    fn test_no_ff_merge_of_local_branch_is_kept() {
        let t = TestRepo::new();
        let (_, _, c, d, _) = simple(&t);
        // feature branch F on D merged with --no-ff while D was the tip
        let f = t.commit("F", &[d]);
        let m = t.merge_taking("Merge feature", &[d, f], 1);
        let e = t.commit("E", &[m]);

        let range = resolver(&t).resolve(c, e, None).unwrap();
        assert_eq!(range.ids(), vec![d, f, e]);
        assert_eq!(range.subjects(), vec!["D", "F", "E"]);
    }

    #[test]
    fn test_incoming() {
        let t = TestRepo::new();
        let (_, _, c, _, e) = simple(&t);
        let r = resolver(&t);
        assert_eq!(r.incoming(c, e).unwrap().ids(), vec![c]);
        assert!(r.incoming(e, e).unwrap().is_empty());
    }
}
