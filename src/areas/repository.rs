//! Repository discovery and the operations composed from the other areas
//!
//! A repository is a git directory (holding objects, refs and the index) and,
//! unless it is bare, the working directory around it. Environment overrides
//! from [`Environment`] are applied once, when the repository is opened.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::{RefLogMessage, Refs};
use crate::areas::workspace::Workspace;
use crate::artifacts::diff::tree_diff::{DiffDelta, DiffOptions, TreeDiff, diff_tree_to_index};
use crate::artifacts::log::rev_walk::RevWalk;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::merge::tree_merge::{MergeOptions, TreeMerge};
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::refs::HEAD;
use crate::artifacts::refs::ref_name::RefName;
use crate::artifacts::refs::revision::Revision;
use crate::config::Environment;
use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const GIT_DIR_NAME: &str = ".git";
const OBJECTS_DIR: &str = "objects";
const INDEX_FILE: &str = "index";
const DEFAULT_BRANCH: &str = "master";
const TAGS_PREFIX: &str = "refs/tags/";
const LAYOUT: [&str; 4] = ["objects/info", "objects/pack", "refs/heads", "refs/tags"];

#[derive(Debug)]
pub struct Repository {
    git_dir: Box<Path>,
    workdir: Option<Box<Path>>,
    database: Arc<Database>,
    refs: Refs,
    index_path: Box<Path>,
}

fn is_git_dir(path: &Path) -> bool {
    path.join(HEAD).is_file() && path.join(OBJECTS_DIR).is_dir()
}

impl Repository {
    /// Create `<path>/.git`; re-initializing an existing repository keeps its HEAD
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let git_dir = path.join(GIT_DIR_NAME);
        Self::create_layout(&git_dir)?;

        Self::from_parts(git_dir, Some(path.to_path_buf()), &Environment::default())
    }

    /// Create a repository without a working directory at `path`
    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self> {
        let git_dir = path.as_ref().to_path_buf();
        Self::create_layout(&git_dir)?;

        Self::from_parts(git_dir, None, &Environment::default())
    }

    fn create_layout(git_dir: &Path) -> Result<()> {
        for dir in LAYOUT {
            std::fs::create_dir_all(git_dir.join(dir))?;
        }

        let head = git_dir.join(HEAD);
        if !head.exists() {
            std::fs::write(&head, format!("ref: refs/heads/{DEFAULT_BRANCH}\n"))?;
        }
        tracing::debug!(git_dir = %git_dir.display(), "initialized repository");

        Ok(())
    }

    /// Open the repository whose working directory or git directory is `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_env(path, &Environment::default())
    }

    pub fn open_with_env(path: impl AsRef<Path>, environment: &Environment) -> Result<Self> {
        let path = path.as_ref();

        let dot_git = path.join(GIT_DIR_NAME);
        if is_git_dir(&dot_git) {
            return Self::from_parts(dot_git, Some(path.to_path_buf()), environment);
        }
        if is_git_dir(path) {
            return Self::from_parts(path.to_path_buf(), None, environment);
        }

        Err(Error::not_found(format!("git repository at {}", path.display())))
    }

    /// Find the repository containing `start`, walking up through its parents
    ///
    /// `GIT_DIR` short-circuits the search; `start` is then the working directory.
    pub fn discover(start: impl AsRef<Path>, environment: &Environment) -> Result<Self> {
        let start = start.as_ref();

        if let Some(git_dir) = &environment.git_dir {
            let git_dir = start.join(git_dir);
            if !is_git_dir(&git_dir) {
                return Err(Error::not_found(format!(
                    "git directory {}",
                    git_dir.display()
                )));
            }
            return Self::from_parts(git_dir, Some(start.to_path_buf()), environment);
        }

        for candidate in start.ancestors() {
            if is_git_dir(&candidate.join(GIT_DIR_NAME)) || is_git_dir(candidate) {
                return Self::open_with_env(candidate, environment);
            }
        }

        Err(Error::not_found(format!(
            "git repository in {} or any parent directory",
            start.display()
        )))
    }

    fn from_parts(
        git_dir: PathBuf,
        workdir: Option<PathBuf>,
        environment: &Environment,
    ) -> Result<Self> {
        let objects_path = environment
            .object_directory
            .clone()
            .unwrap_or_else(|| git_dir.join(OBJECTS_DIR));
        let database = Database::new(objects_path)?;
        for alternate in &environment.alternate_object_directories {
            database.add_alternate_path(alternate)?;
        }

        let index_path = environment
            .index_file
            .clone()
            .unwrap_or_else(|| git_dir.join(INDEX_FILE));
        tracing::debug!(
            git_dir = %git_dir.display(),
            bare = workdir.is_none(),
            "opened repository"
        );

        Ok(Repository {
            refs: Refs::new(git_dir.clone()),
            git_dir: git_dir.into_boxed_path(),
            workdir: workdir.map(PathBuf::into_boxed_path),
            database: Arc::new(database),
            index_path: index_path.into_boxed_path(),
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.workdir.is_none()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> Option<Workspace> {
        self.workdir.as_deref().map(Workspace::new)
    }

    /// Load the index, bound to this repository's database and workspace
    pub fn index(&self) -> Result<Index> {
        let index = Index::open(self.index_path.to_path_buf())?
            .with_database(Arc::clone(&self.database));

        Ok(match self.workspace() {
            Some(workspace) => index.with_workspace(workspace),
            None => index,
        })
    }

    fn expect_type(&self, oid: &ObjectId, expected: ObjectType) -> Result<()> {
        let header = self.database.read_header(oid)?;
        if header.object_type != expected {
            return Err(Error::invalid_argument(format!(
                "{oid} is a {}, not a {}",
                header.object_type.as_str(),
                expected.as_str()
            )));
        }

        Ok(())
    }

    /// Write a commit and optionally move `update_ref` (following symbolic refs) to it
    pub fn create_commit(
        &self,
        update_ref: Option<&str>,
        author: &Signature,
        committer: &Signature,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId> {
        self.expect_type(tree, ObjectType::Tree)?;
        for parent in parents {
            self.expect_type(parent, ObjectType::Commit)?;
        }

        let commit = Commit::new(
            parents.to_vec(),
            *tree,
            author.clone(),
            committer.clone(),
            message.to_string(),
        );
        let oid = self.database.store(&commit)?;

        if let Some(name) = update_ref {
            let kind = match parents.len() {
                0 => "commit (initial)",
                1 => "commit",
                _ => "commit (merge)",
            };
            let log = format!("{kind}: {}", commit.summary());
            self.refs
                .update(name, oid, None, Some(RefLogMessage::new(committer, &log)))?;
        }
        tracing::debug!(%oid, parents = parents.len(), "created commit");

        Ok(oid)
    }

    /// Write an annotated tag object and `refs/tags/<name>` pointing at it
    pub fn create_tag(
        &self,
        name: &str,
        target: &ObjectId,
        tagger: &Signature,
        message: &str,
        force: bool,
    ) -> Result<ObjectId> {
        let ref_name = RefName::try_parse(format!("{TAGS_PREFIX}{name}"))?;
        let header = self.database.read_header(target)?;

        let tag = Tag::new(
            *target,
            header.object_type,
            name.to_string(),
            Some(tagger.clone()),
            message.to_string(),
        );
        let oid = self.database.store(&tag)?;
        self.refs.create_direct(ref_name.as_str(), oid, force, None)?;

        Ok(oid)
    }

    /// Point `refs/tags/<name>` straight at `target`
    pub fn create_lightweight_tag(&self, name: &str, target: &ObjectId, force: bool) -> Result<()> {
        if !self.database.exists(target)? {
            return Err(Error::object_not_found(target));
        }

        self.refs
            .create_direct(&format!("{TAGS_PREFIX}{name}"), *target, force, None)?;

        Ok(())
    }

    /// Resolve a single revision expression to an object id
    pub fn revparse_single(&self, spec: &str) -> Result<ObjectId> {
        Revision::try_parse(spec)?.resolve(self)
    }

    pub fn rev_walk(&self) -> RevWalk<'_> {
        RevWalk::new(self)
    }

    /// Compare two tree-ish objects; `None` stands for the empty tree
    pub fn diff_trees(
        &self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        options: &DiffOptions,
    ) -> Result<Vec<DiffDelta>> {
        let old = old.map(|oid| self.database.peel_to_tree(oid)).transpose()?;
        let new = new.map(|oid| self.database.peel_to_tree(oid)).transpose()?;

        let mut diff = TreeDiff::new(&self.database, options);
        diff.compare_oids(old.as_ref(), new.as_ref(), b"")?;

        Ok(diff.into_deltas())
    }

    pub fn diff_tree_to_index(
        &self,
        tree: Option<&ObjectId>,
        index: &Index,
        options: &DiffOptions,
    ) -> Result<Vec<DiffDelta>> {
        let tree = tree.map(|oid| self.database.peel_to_tree(oid)).transpose()?;
        diff_tree_to_index(&self.database, tree.as_ref(), index.entries(), options)
    }

    pub fn merge_trees(
        &self,
        ancestor: Option<&ObjectId>,
        ours: &ObjectId,
        theirs: &ObjectId,
        options: MergeOptions,
    ) -> Result<Index> {
        let ancestor = ancestor
            .map(|oid| self.database.peel_to_tree(oid))
            .transpose()?;
        let ours = self.database.peel_to_tree(ours)?;
        let theirs = self.database.peel_to_tree(theirs)?;

        TreeMerge::new(&self.database, options).merge(ancestor.as_ref(), &ours, &theirs)
    }

    /// Merge the trees of two commits against their merge base
    ///
    /// With several merge bases the ancestor is their own merge, when that
    /// merge is clean, and the newest base otherwise.
    pub fn merge_commits(
        &self,
        ours: &ObjectId,
        theirs: &ObjectId,
        options: MergeOptions,
    ) -> Result<Index> {
        let bases = self.merge_bases(ours, theirs)?;
        let ancestor = self.virtual_ancestor(&bases)?;

        let ours = self.tree_of_commit(ours)?;
        let theirs = self.tree_of_commit(theirs)?;

        TreeMerge::new(&self.database, options).merge(ancestor.as_ref(), &ours, &theirs)
    }

    fn tree_of_commit(&self, oid: &ObjectId) -> Result<ObjectId> {
        let commit = self.database.peel_to_commit(oid)?;
        Ok(*self.database.parse_object_as_commit(&commit)?.tree_oid())
    }

    fn virtual_ancestor(&self, bases: &[ObjectId]) -> Result<Option<ObjectId>> {
        let Some((newest, rest)) = bases.split_first() else {
            return Ok(None);
        };

        let fallback = self.tree_of_commit(newest)?;
        let mut tree = fallback;
        for base in rest {
            let ancestor = match self.merge_base(newest, base)? {
                Some(commit) => Some(self.tree_of_commit(&commit)?),
                None => None,
            };

            let merged = TreeMerge::new(&self.database, MergeOptions::default()).merge(
                ancestor.as_ref(),
                &tree,
                &self.tree_of_commit(base)?,
            )?;
            if merged.has_conflicts() {
                tracing::debug!(%newest, %base, "merge bases conflict, using the newest");
                return Ok(Some(fallback));
            }
            tree = merged.create_tree()?;
        }

        Ok(Some(tree))
    }

    fn bca_finder(&self) -> BCAFinder<impl Fn(&ObjectId) -> Result<SlimCommit> + '_> {
        BCAFinder::new(|oid: &ObjectId| self.database.load_slim_commit(oid))
    }

    /// Every best common ancestor, newest first
    pub fn merge_bases(&self, one: &ObjectId, two: &ObjectId) -> Result<Vec<ObjectId>> {
        let one = self.database.peel_to_commit(one)?;
        let two = self.database.peel_to_commit(two)?;

        self.bca_finder().find_best_common_ancestors(&one, &two)
    }

    pub fn merge_base(&self, one: &ObjectId, two: &ObjectId) -> Result<Option<ObjectId>> {
        Ok(self.merge_bases(one, two)?.into_iter().next())
    }

    /// Whether `ancestor` is reachable from `commit`; a commit does not descend from itself
    pub fn is_descendant_of(&self, commit: &ObjectId, ancestor: &ObjectId) -> Result<bool> {
        let commit = self.database.peel_to_commit(commit)?;
        let ancestor = self.database.peel_to_commit(ancestor)?;

        self.bca_finder().is_descendant_of(&commit, &ancestor)
    }
}
