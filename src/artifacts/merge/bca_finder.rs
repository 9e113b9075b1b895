//! Best common ancestor finder
//!
//! ## Algorithm Overview
//!
//! ### Phase 1: Paint down to common
//!
//! Both sides are walked newest-first from a single time-ordered queue. Each
//! commit carries the side(s) it was reached from. A commit reached from both
//! sides is a common ancestor; its own ancestors are painted STALE, since they
//! can only be worse candidates. The walk stops once every queued commit is
//! stale.
//!
//! ### Phase 2: Remove redundant candidates
//!
//! > A best common ancestor of X and Y is a common ancestor of X and Y that is
//! > not an ancestor of any other common ancestor.
//!
//! Each candidate is painted against the others; a candidate reached from
//! another candidate's side is an ancestor of it and is dropped.
//!
//! Criss-cross histories keep several best common ancestors. All of them are
//! returned, newest first.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bitflags::bitflags;
use chrono::{DateTime, FixedOffset};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b00;
        const VISITED_FROM_SOURCE = 0b01;
        const VISITED_FROM_TARGET = 0b10;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.contains(VisitState::VISITED_FROM_SOURCE) {
            flags.push("SOURCE");
        }
        if self.contains(VisitState::VISITED_FROM_TARGET) {
            flags.push("TARGET");
        }
        if self.contains(VisitState::STALE) {
            flags.push("STALE");
        }
        if self.contains(VisitState::RESULT) {
            flags.push("RESULT");
        }
        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

/// Outcome of one painting pass
#[derive(Debug, Default)]
struct Painting {
    states: HashMap<ObjectId, VisitState>,
    /// Commits reached from both sides, in discovery order
    results: Vec<(DateTime<FixedOffset>, ObjectId)>,
}

impl Painting {
    fn state(&self, oid: &ObjectId) -> VisitState {
        self.states.get(oid).copied().unwrap_or(VisitState::NONE)
    }
}

/// Time-ordered walk queue that tracks how many entries are not yet stale
///
/// The same commit may be queued more than once; each entry counts.
#[derive(Debug, Default)]
struct PaintQueue {
    heap: BinaryHeap<(DateTime<FixedOffset>, ObjectId)>,
    queued: HashMap<ObjectId, usize>,
    non_stale: usize,
}

impl PaintQueue {
    fn push(&mut self, timestamp: DateTime<FixedOffset>, oid: ObjectId, state: VisitState) {
        *self.queued.entry(oid).or_default() += 1;
        if !state.contains(VisitState::STALE) {
            self.non_stale += 1;
        }
        self.heap.push((timestamp, oid));
    }

    fn pop(&mut self, painting: &Painting) -> Option<(DateTime<FixedOffset>, ObjectId)> {
        let (timestamp, oid) = self.heap.pop()?;
        if let Some(count) = self.queued.get_mut(&oid) {
            *count -= 1;
            if *count == 0 {
                self.queued.remove(&oid);
            }
        }
        if !painting.state(&oid).contains(VisitState::STALE) {
            self.non_stale -= 1;
        }
        Some((timestamp, oid))
    }

    /// Records that every queued entry of `oid` has just turned stale
    fn mark_stale(&mut self, oid: &ObjectId) {
        self.non_stale -= self.queued.get(oid).copied().unwrap_or(0);
    }

    fn has_non_stale(&self) -> bool {
        self.non_stale > 0
    }
}

/// Finds common ancestors through a caller-supplied commit loader
///
/// The loader returns parents and committer time for a commit id, which keeps
/// the finder independent of where commits are stored.
#[derive(Debug, Clone)]
pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self { commit_loader }
    }

    fn paint_down_to_common(&self, source: &ObjectId, targets: &[ObjectId]) -> Result<Painting> {
        let mut painting = Painting::default();
        let mut queue = PaintQueue::default();

        let source_commit = (self.commit_loader)(source)?;
        painting.states.insert(*source, VisitState::VISITED_FROM_SOURCE);
        queue.push(source_commit.timestamp, *source, VisitState::VISITED_FROM_SOURCE);

        for target in targets {
            let target_commit = (self.commit_loader)(target)?;
            let state = painting.states.entry(*target).or_insert(VisitState::NONE);
            *state |= VisitState::VISITED_FROM_TARGET;
            let state = *state;
            queue.push(target_commit.timestamp, *target, state);
        }

        while queue.has_non_stale() {
            let Some((timestamp, commit_id)) = queue.pop(&painting) else {
                break;
            };

            let current_state = painting.state(&commit_id);
            let mut flags = current_state & (VisitState::VISITED_FROM_BOTH | VisitState::STALE);
            tracing::trace!(commit = %commit_id, state = ?current_state, "painting commit");

            if flags == VisitState::VISITED_FROM_BOTH {
                if !current_state.contains(VisitState::RESULT) {
                    painting.states.insert(commit_id, current_state | VisitState::RESULT);
                    painting.results.push((timestamp, commit_id));
                }
                flags |= VisitState::STALE;
            }

            for parent_id in (self.commit_loader)(&commit_id)?.parents {
                let parent_state = painting.state(&parent_id);
                if parent_state.contains(flags) {
                    continue;
                }

                let parent_commit = (self.commit_loader)(&parent_id)?;
                let painted = parent_state | flags;
                if !parent_state.contains(VisitState::STALE) && painted.contains(VisitState::STALE) {
                    queue.mark_stale(&parent_id);
                }
                painting.states.insert(parent_id, painted);
                queue.push(parent_commit.timestamp, parent_id, painted);
            }
        }

        Ok(painting)
    }

    /// Every best common ancestor of the two commits, newest first
    ///
    /// Empty when the histories are unrelated.
    pub fn find_best_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> Result<Vec<ObjectId>> {
        if source_commit_id == target_commit_id {
            return Ok(vec![*source_commit_id]);
        }

        let painting = self.paint_down_to_common(source_commit_id, &[*target_commit_id])?;
        let mut candidates: Vec<(DateTime<FixedOffset>, ObjectId)> = painting
            .results
            .iter()
            .filter(|(_, oid)| !painting.state(oid).contains(VisitState::STALE))
            .copied()
            .collect();
        // stable, equal times keep discovery order
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        tracing::trace!(candidates = candidates.len(), "found common ancestors");

        let candidates: Vec<ObjectId> = candidates.into_iter().map(|(_, oid)| oid).collect();
        let best = self.remove_redundant(candidates)?;
        tracing::debug!(
            source = %source_commit_id,
            target = %target_commit_id,
            bases = best.len(),
            "computed merge bases"
        );

        Ok(best)
    }

    /// The newest best common ancestor
    pub fn find_best_common_ancestor(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> Result<Option<ObjectId>> {
        Ok(self
            .find_best_common_ancestors(source_commit_id, target_commit_id)?
            .into_iter()
            .next())
    }

    fn remove_redundant(&self, candidates: Vec<ObjectId>) -> Result<Vec<ObjectId>> {
        if candidates.len() < 2 {
            return Ok(candidates);
        }

        let mut redundant = HashSet::<ObjectId>::new();
        for commit in &candidates {
            if redundant.contains(commit) {
                continue;
            }

            let others: Vec<ObjectId> = candidates
                .iter()
                .filter(|other| *other != commit && !redundant.contains(*other))
                .copied()
                .collect();
            let painting = self.paint_down_to_common(commit, &others)?;

            if painting.state(commit).contains(VisitState::VISITED_FROM_TARGET) {
                redundant.insert(*commit);
            }
            for other in &others {
                if painting.state(other).contains(VisitState::VISITED_FROM_SOURCE) {
                    redundant.insert(*other);
                }
            }
        }
        tracing::trace!(redundant = redundant.len(), "removed redundant ancestors");

        Ok(candidates
            .into_iter()
            .filter(|commit| !redundant.contains(commit))
            .collect())
    }

    /// Whether `ancestor` is reachable from `commit` through parent links
    ///
    /// A commit is not its own descendant.
    pub fn is_descendant_of(&self, commit: &ObjectId, ancestor: &ObjectId) -> Result<bool> {
        if commit == ancestor {
            return Ok(false);
        }

        let mut seen = HashSet::from([*commit]);
        let mut queue = BinaryHeap::from([((self.commit_loader)(commit)?.timestamp, *commit)]);

        while let Some((_, oid)) = queue.pop() {
            for parent in (self.commit_loader)(&oid)?.parents {
                if parent == *ancestor {
                    return Ok(true);
                }
                if seen.insert(parent) {
                    queue.push(((self.commit_loader)(&parent)?.timestamp, parent));
                }
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object_type::ObjectType;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    struct Graph {
        commits: HashMap<ObjectId, SlimCommit>,
    }

    fn oid(name: &str) -> ObjectId {
        ObjectId::hash(ObjectType::Commit, name.as_bytes())
    }

    impl Graph {
        fn new(spec: &[(&str, &[&str], i64)]) -> Self {
            let offset = FixedOffset::east_opt(0).unwrap();
            let commits = spec
                .iter()
                .map(|(name, parents, time)| {
                    let commit = SlimCommit {
                        oid: oid(name),
                        parents: parents.iter().map(|parent| oid(parent)).collect(),
                        timestamp: offset.timestamp_opt(*time, 0).unwrap(),
                    };
                    (commit.oid, commit)
                })
                .collect();
            Graph { commits }
        }

        fn finder(&self) -> BCAFinder<impl Fn(&ObjectId) -> Result<SlimCommit> + '_> {
            BCAFinder::new(|id: &ObjectId| {
                self.commits
                    .get(id)
                    .cloned()
                    .ok_or_else(|| crate::errors::Error::object_not_found(id))
            })
        }

        fn bases(&self, a: &str, b: &str) -> Vec<ObjectId> {
            self.finder().find_best_common_ancestors(&oid(a), &oid(b)).unwrap()
        }
    }

    /// ```text
    /// A - B - C - D
    ///      \
    ///       E - F
    /// ```
    #[fixture]
    fn branched() -> Graph {
        Graph::new(&[
            ("A", &[], 1),
            ("B", &["A"], 2),
            ("C", &["B"], 3),
            ("D", &["C"], 4),
            ("E", &["B"], 5),
            ("F", &["E"], 6),
        ])
    }

    /// ```text
    ///     A
    ///    / \
    ///   B   C
    ///   |\ /|
    ///   | X |
    ///   |/ \|
    ///   D   E
    ///   |   |
    ///   F   G
    /// ```
    #[fixture]
    fn criss_cross() -> Graph {
        Graph::new(&[
            ("A", &[], 1),
            ("B", &["A"], 2),
            ("C", &["A"], 3),
            ("D", &["B", "C"], 4),
            ("E", &["C", "B"], 5),
            ("F", &["D"], 6),
            ("G", &["E"], 7),
        ])
    }

    #[rstest]
    fn linear_history_picks_the_older_commit(branched: Graph) {
        assert_eq!(branched.bases("D", "B"), vec![oid("B")]);
        assert_eq!(branched.bases("B", "D"), vec![oid("B")]);
    }

    #[rstest]
    fn divergent_branches_meet_at_the_fork(branched: Graph) {
        assert_eq!(branched.bases("D", "F"), vec![oid("B")]);
        assert_eq!(branched.bases("F", "D"), vec![oid("B")]);
    }

    #[rstest]
    fn a_commit_is_its_own_base(branched: Graph) {
        assert_eq!(branched.bases("C", "C"), vec![oid("C")]);
    }

    #[rstest]
    fn criss_cross_merges_have_two_bases(criss_cross: Graph) {
        assert_eq!(criss_cross.bases("F", "G"), vec![oid("C"), oid("B")]);
        assert_eq!(
            criss_cross.finder().find_best_common_ancestor(&oid("F"), &oid("G")).unwrap(),
            Some(oid("C"))
        );
    }

    #[test]
    fn unrelated_histories_have_no_base() {
        let graph = Graph::new(&[("A", &[], 1), ("B", &[], 2)]);
        assert_eq!(graph.bases("A", "B"), Vec::<ObjectId>::new());
    }

    #[rstest]
    fn redundant_ancestors_are_dropped(branched: Graph) {
        let kept = branched
            .finder()
            .remove_redundant(vec![oid("A"), oid("C"), oid("F")])
            .unwrap();
        assert_eq!(kept, vec![oid("C"), oid("F")]);
    }

    #[test]
    fn merging_the_fork_back_moves_the_base() {
        let graph = Graph::new(&[
            ("A", &[], 1),
            ("B", &["A"], 2),
            ("C", &["B"], 3),
            ("M", &["C", "B"], 4),
            ("X", &["M"], 5),
            ("Y", &["M"], 6),
        ]);
        assert_eq!(graph.bases("X", "Y"), vec![oid("M")]);
    }

    #[rstest]
    fn descendants_follow_parent_links(criss_cross: Graph) {
        let finder = criss_cross.finder();

        assert!(finder.is_descendant_of(&oid("G"), &oid("B")).unwrap());
        assert!(finder.is_descendant_of(&oid("F"), &oid("A")).unwrap());
        assert!(!finder.is_descendant_of(&oid("B"), &oid("G")).unwrap());
        assert!(!finder.is_descendant_of(&oid("F"), &oid("G")).unwrap());
        assert!(!finder.is_descendant_of(&oid("F"), &oid("F")).unwrap());
    }

    #[test]
    fn long_histories_stop_at_the_fork() {
        let mut names: Vec<String> = vec!["root".into()];
        let mut history: Vec<(String, Vec<String>, i64)> = vec![("root".into(), vec![], 0)];
        for index in 1..=2000 {
            let name = format!("main-{index}");
            history.push((name.clone(), vec![names.last().unwrap().clone()], index));
            names.push(name);
        }
        history.push(("left".into(), vec!["main-2000".into()], 3000));
        history.push(("right".into(), vec!["main-2000".into()], 3001));

        let parents: Vec<Vec<&str>> = history
            .iter()
            .map(|(_, parents, _)| parents.iter().map(String::as_str).collect())
            .collect();
        let rows: Vec<(&str, &[&str], i64)> = history
            .iter()
            .zip(&parents)
            .map(|((name, _, time), parents)| (name.as_str(), parents.as_slice(), *time))
            .collect();
        let graph = Graph::new(&rows);

        assert_eq!(graph.bases("left", "right"), vec![oid("main-2000")]);
        assert_eq!(graph.bases("left", "main-1"), vec![oid("main-1")]);
    }

    #[rstest]
    fn stale_entries_do_not_keep_the_walk_alive(criss_cross: Graph) {
        let painting = criss_cross
            .finder()
            .paint_down_to_common(&oid("F"), &[oid("G")])
            .unwrap();
        assert!(painting.state(&oid("A")).contains(VisitState::STALE));
        assert_eq!(painting.results.len(), 2);
    }

    #[test]
    fn missing_commits_surface_as_errors() {
        let graph = Graph::new(&[("A", &["missing"], 1), ("B", &[], 2)]);
        let error = graph
            .finder()
            .find_best_common_ancestors(&oid("A"), &oid("B"))
            .unwrap_err();
        assert!(error.is_not_found());
    }
}
