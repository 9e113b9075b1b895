use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::refs::REFS_PREFIX;
use crate::artifacts::refs::revision::Revision;
use crate::errors::{Error, Result};
use bitflags::bitflags;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

bitflags! {
    /// Output ordering; `NONE` is discovery order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Sorting: u32 {
        const NONE = 0;
        /// Committer time, newest first
        const TIME = 1 << 0;
        /// Children before parents
        const TOPOLOGICAL = 1 << 1;
        /// Invert whatever order the other flags produce
        const REVERSE = 1 << 2;
    }
}

/// Frontier item: newest committer time first, then first inserted
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedCommit {
    commit: SlimCommit,
    sequence: Reverse<usize>,
}

impl PartialOrd for QueuedCommit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedCommit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.commit
            .timestamp
            .cmp(&other.commit.timestamp)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Max-heap over commits with a stable tie-break on insertion order
#[derive(Debug, Default)]
struct DateQueue {
    heap: BinaryHeap<QueuedCommit>,
    inserted: usize,
}

impl DateQueue {
    fn push(&mut self, commit: SlimCommit) {
        self.heap.push(QueuedCommit {
            commit,
            sequence: Reverse(self.inserted),
        });
        self.inserted += 1;
    }

    fn pop(&mut self) -> Option<SlimCommit> {
        self.heap.pop().map(|queued| queued.commit)
    }
}

/// Traversal over the commit graph
///
/// Commits reachable from the pushed roots are yielded unless they are
/// reachable from a hidden root. Changing the roots, the hidden set or the
/// sorting after iteration started restarts the walk.
pub struct RevWalk<'r> {
    repository: &'r Repository,
    pushed: Vec<ObjectId>,
    hidden: Vec<ObjectId>,
    sorting: Sorting,
    first_parent: bool,
    prepared: Option<VecDeque<ObjectId>>,
}

impl<'r> RevWalk<'r> {
    pub fn new(repository: &'r Repository) -> Self {
        RevWalk {
            repository,
            pushed: Vec::new(),
            hidden: Vec::new(),
            sorting: Sorting::NONE,
            first_parent: false,
            prepared: None,
        }
    }

    pub fn sorting(&self) -> Sorting {
        self.sorting
    }

    pub fn set_sorting(&mut self, sorting: Sorting) {
        self.sorting = sorting;
        self.prepared = None;
    }

    /// Follow only the first parent of merges
    pub fn simplify_first_parent(&mut self) {
        self.first_parent = true;
        self.prepared = None;
    }

    /// Forget every pushed and hidden root; sorting is kept
    pub fn reset(&mut self) {
        self.pushed.clear();
        self.hidden.clear();
        self.prepared = None;
    }

    pub fn push(&mut self, oid: &ObjectId) -> Result<()> {
        let commit = self.repository.database().peel_to_commit(oid)?;
        self.pushed.push(commit);
        self.prepared = None;
        Ok(())
    }

    pub fn push_ref(&mut self, name: &str) -> Result<()> {
        let oid = self.repository.refs().resolve(name)?;
        self.push(&oid)
    }

    pub fn push_head(&mut self) -> Result<()> {
        self.push_ref("HEAD")
    }

    /// Push every reference matching `glob`, skipping those not naming a commit
    pub fn push_glob(&mut self, glob: &str) -> Result<()> {
        for oid in self.expand_glob(glob)? {
            self.push(&oid)?;
        }
        Ok(())
    }

    /// `a..b`: commits reachable from `b` but not from `a`; an empty side is `HEAD`
    pub fn push_range(&mut self, range: &str) -> Result<()> {
        let (hide, push) = range
            .split_once("..")
            .ok_or_else(|| Error::invalid_argument(format!("{range:?} is not a range")))?;
        if hide.is_empty() && push.is_empty() {
            return Err(Error::invalid_argument(format!("{range:?} is not a range")));
        }

        let side = |revision: &str| -> Result<ObjectId> {
            let revision = if revision.is_empty() { "HEAD" } else { revision };
            Revision::try_parse(revision)?.resolve(self.repository)
        };
        let (hide, push) = (side(hide)?, side(push)?);

        self.hide(&hide)?;
        self.push(&push)
    }

    pub fn hide(&mut self, oid: &ObjectId) -> Result<()> {
        let commit = self.repository.database().peel_to_commit(oid)?;
        self.hidden.push(commit);
        self.prepared = None;
        Ok(())
    }

    pub fn hide_ref(&mut self, name: &str) -> Result<()> {
        let oid = self.repository.refs().resolve(name)?;
        self.hide(&oid)
    }

    pub fn hide_head(&mut self) -> Result<()> {
        self.hide_ref("HEAD")
    }

    pub fn hide_glob(&mut self, glob: &str) -> Result<()> {
        for oid in self.expand_glob(glob)? {
            self.hide(&oid)?;
        }
        Ok(())
    }

    fn expand_glob(&self, glob: &str) -> Result<Vec<ObjectId>> {
        let mut pattern = if glob.starts_with(REFS_PREFIX) {
            glob.to_string()
        } else {
            format!("{REFS_PREFIX}{glob}")
        };
        if !pattern.contains(['*', '?', '[']) {
            pattern = format!("{}/*", pattern.trim_end_matches('/'));
        }

        let refs = self.repository.refs();
        let database = self.repository.database();
        let mut commits = Vec::new();
        for reference in refs.list(Some(&pattern))? {
            let oid = refs.resolve(reference.name().as_str())?;
            match database.peel(&oid)? {
                (commit, ObjectType::Commit) => commits.push(commit),
                (other, object_type) => {
                    tracing::debug!(reference = %reference.name(), %other, %object_type, "skipping non-commit reference");
                }
            }
        }

        Ok(commits)
    }

    fn load(&self, oid: &ObjectId) -> Result<SlimCommit> {
        self.repository.database().load_slim_commit(oid)
    }

    fn parents<'c>(&self, commit: &'c SlimCommit) -> &'c [ObjectId] {
        if self.first_parent {
            &commit.parents[..commit.parents.len().min(1)]
        } else {
            &commit.parents
        }
    }

    fn hidden_closure(&self) -> Result<HashSet<ObjectId>> {
        let mut hidden: HashSet<ObjectId> = HashSet::new();
        let mut pending: Vec<ObjectId> = self.hidden.clone();

        while let Some(oid) = pending.pop() {
            if !hidden.insert(oid) {
                continue;
            }
            pending.extend(self.load(&oid)?.parents.iter().filter(|parent| !hidden.contains(*parent)));
        }

        Ok(hidden)
    }

    /// Visible commits in the order a time-ordered frontier discovers them
    fn discover(&self, hidden: &HashSet<ObjectId>) -> Result<Vec<SlimCommit>> {
        let mut queue = DateQueue::default();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut discovered = Vec::new();

        for oid in &self.pushed {
            if !hidden.contains(oid) && seen.insert(*oid) {
                queue.push(self.load(oid)?);
            }
        }

        while let Some(commit) = queue.pop() {
            for parent in self.parents(&commit) {
                if !hidden.contains(parent) && seen.insert(*parent) {
                    queue.push(self.load(parent)?);
                }
            }
            discovered.push(commit);
        }

        Ok(discovered)
    }

    /// Kahn's algorithm over the discovered commits
    ///
    /// Ready commits come off a stack, so a merge continues down its last
    /// parent first, or off a date queue when time ordering is also requested.
    fn topological(&self, discovered: Vec<SlimCommit>) -> Vec<ObjectId> {
        let mut indegree: HashMap<ObjectId, usize> =
            discovered.iter().map(|commit| (commit.oid, 0)).collect();
        for commit in &discovered {
            for parent in self.parents(commit) {
                if let Some(count) = indegree.get_mut(parent) {
                    *count += 1;
                }
            }
        }

        let by_oid: HashMap<ObjectId, SlimCommit> = discovered
            .iter()
            .map(|commit| (commit.oid, commit.clone()))
            .collect();
        let tips = discovered
            .into_iter()
            .filter(|commit| indegree.get(&commit.oid) == Some(&0));

        let by_date = self.sorting.contains(Sorting::TIME);
        let mut stack: Vec<SlimCommit> = Vec::new();
        let mut queue = DateQueue::default();
        if by_date {
            tips.for_each(|commit| queue.push(commit));
        } else {
            stack.extend(tips);
            stack.reverse();
        }

        let mut ordered = Vec::with_capacity(by_oid.len());
        loop {
            let next = if by_date { queue.pop() } else { stack.pop() };
            let Some(commit) = next else {
                break;
            };

            for parent in self.parents(&commit) {
                let Some(count) = indegree.get_mut(parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0
                    && let Some(parent) = by_oid.get(parent)
                {
                    if by_date {
                        queue.push(parent.clone());
                    } else {
                        stack.push(parent.clone());
                    }
                }
            }
            ordered.push(commit.oid);
        }

        ordered
    }

    fn prepare(&self) -> Result<VecDeque<ObjectId>> {
        let hidden = self.hidden_closure()?;
        let mut discovered = self.discover(&hidden)?;
        tracing::debug!(
            pushed = self.pushed.len(),
            hidden = hidden.len(),
            visible = discovered.len(),
            sorting = ?self.sorting,
            "prepared revision walk"
        );

        let mut ordered: Vec<ObjectId> = if self.sorting.contains(Sorting::TOPOLOGICAL) {
            self.topological(discovered)
        } else {
            if self.sorting.contains(Sorting::TIME) {
                // stable, so equal times keep discovery order
                discovered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            }
            discovered.into_iter().map(|commit| commit.oid).collect()
        };

        if self.sorting.contains(Sorting::REVERSE) {
            ordered.reverse();
        }

        Ok(ordered.into())
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.prepared.is_none() {
            match self.prepare() {
                Ok(prepared) => self.prepared = Some(prepared),
                Err(error) => {
                    self.prepared = Some(VecDeque::new());
                    return Some(Err(error));
                }
            }
        }

        self.prepared.as_mut()?.pop_front().map(Ok)
    }
}
