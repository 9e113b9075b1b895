//! Git references (branches, HEAD, tags)
//!
//! This module manages Git references which are human-readable names pointing to objects.
//! References can be:
//! - Direct: Containing an object SHA-1
//! - Symbolic: Pointing to another reference (e.g., HEAD -> refs/heads/main)
//!
//! ## Storage
//!
//! - Loose refs: one file per reference under the git directory
//! - `packed-refs`: many references in one file; a loose ref shadows a packed one
//! - `logs/<name>`: reflog lines appended on every logged mutation
//!
//! Every write goes through `<file>.lock` and a rename.

use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::refs::packed_refs::PackedRefs;
use crate::artifacts::refs::ref_name::RefName;
use crate::artifacts::refs::reference::{RefTarget, Reference};
use crate::artifacts::refs::reflog::ReflogEntry;
use crate::artifacts::refs::{DWIM_RULES, HEAD, MAX_SYMREF_DEPTH, REFS_PREFIX};
use crate::errors::{Error, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PACKED_REFS: &str = "packed-refs";
const LOGS_DIR: &str = "logs";

/// Identity and message recorded in the reflog for a mutation
#[derive(Debug, Clone, Copy)]
pub struct RefLogMessage<'a> {
    pub committer: &'a Signature,
    pub message: &'a str,
}

impl<'a> RefLogMessage<'a> {
    pub fn new(committer: &'a Signature, message: &'a str) -> Self {
        RefLogMessage { committer, message }
    }
}

/// Git references manager
///
/// Handles reading and writing references stored under a git directory.
#[derive(Debug, Clone)]
pub struct Refs {
    /// Path to the git directory (typically `.git`)
    path: Box<Path>,
}

impl Refs {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Refs {
            path: path.into().into_boxed_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.path.join(name.as_str())
    }

    fn log_path(&self, name: &RefName) -> PathBuf {
        self.path.join(LOGS_DIR).join(name.as_str())
    }

    fn packed_refs_path(&self) -> PathBuf {
        self.path.join(PACKED_REFS)
    }

    fn read_packed(&self) -> Result<PackedRefs> {
        match std::fs::read_to_string(self.packed_refs_path()) {
            Ok(content) => PackedRefs::parse(&content),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(PackedRefs::default()),
            Err(error) => Err(error.into()),
        }
    }

    fn read_loose(&self, name: &RefName) -> Result<Option<RefTarget>> {
        let path = self.ref_path(name);
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        RefTarget::parse(&content).map(Some).map_err(|error| {
            Error::invalid_argument(format!("broken reference {name}: {error}"))
        })
    }

    /// Read a single reference without following it
    pub fn read(&self, name: &RefName) -> Result<Option<Reference>> {
        if let Some(target) = self.read_loose(name)? {
            return Ok(Some(Reference::new(name.clone(), target)));
        }

        Ok(self
            .read_packed()?
            .get(name.as_str())
            .map(|packed| Reference::new(name.clone(), RefTarget::Direct(packed.oid))))
    }

    /// Like [`Refs::read`], but a missing reference is `NotFound`
    pub fn find(&self, name: &str) -> Result<Reference> {
        let name = RefName::try_parse(name)?;
        self.read(&name)?
            .ok_or_else(|| Error::not_found(format!("reference {name}")))
    }

    /// Follow a symbolic chain from `name`
    ///
    /// Returns every name visited, outermost first, and the final object id,
    /// which is `None` when the chain ends at a reference that does not exist
    /// yet (an unborn branch).
    pub fn follow(&self, name: &RefName) -> Result<(Vec<RefName>, Option<ObjectId>)> {
        let mut chain = vec![name.clone()];

        loop {
            let Some(current) = chain.last() else {
                return Err(Error::invalid_argument("empty reference chain"));
            };

            match self.read(current)?.map(|reference| reference.target().clone()) {
                None => return Ok((chain, None)),
                Some(RefTarget::Direct(oid)) => return Ok((chain, Some(oid))),
                Some(RefTarget::Symbolic(next)) => {
                    if chain.contains(&next) {
                        return Err(Error::invalid_argument(format!(
                            "symbolic reference cycle through {next}"
                        )));
                    }
                    if chain.len() > MAX_SYMREF_DEPTH {
                        return Err(Error::invalid_argument(format!(
                            "symbolic reference chain from {name} is too deep"
                        )));
                    }
                    tracing::trace!(from = %current, to = %next, "following symbolic reference");
                    chain.push(next);
                }
            }
        }
    }

    /// Object id a reference ultimately points at
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        let name = RefName::try_parse(name)?;
        match self.follow(&name)? {
            (_, Some(oid)) => Ok(oid),
            (chain, None) => Err(Error::not_found(format!(
                "reference {}",
                chain.last().unwrap_or(&name)
            ))),
        }
    }

    /// Commit HEAD points at, `None` on an unborn branch
    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        Ok(self.follow(&RefName::try_parse(HEAD)?)?.1)
    }

    /// Name at the end of the symbolic chain starting at `name`
    pub fn current_ref(&self, name: &str) -> Result<RefName> {
        let name = RefName::try_parse(name)?;
        let (mut chain, _) = self.follow(&name)?;
        Ok(chain.pop().unwrap_or(name))
    }

    /// Peeled target recorded in `packed-refs` for an annotated tag
    pub fn peeled(&self, name: &RefName) -> Result<Option<ObjectId>> {
        Ok(self.read_packed()?.get(name.as_str()).and_then(|packed| packed.peeled))
    }

    /// Expand a short name the way git does (`main` -> `refs/heads/main`)
    pub fn dwim(&self, short: &str) -> Result<Option<RefName>> {
        for rule in DWIM_RULES {
            let Ok(candidate) = RefName::try_parse(rule.replace("{}", short)) else {
                continue;
            };
            if self.read(&candidate)?.is_some() {
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }

    /// Every reference under `refs/`, sorted by name, optionally filtered by a glob
    ///
    /// In the glob `*` and `?` also match `/`, and `[...]` classes are supported.
    pub fn list(&self, glob: Option<&str>) -> Result<Vec<Reference>> {
        let pattern = glob.map(Self::glob_to_regex).transpose()?;

        let mut references = Vec::new();
        for name in self.list_names()? {
            if pattern.as_ref().is_some_and(|pattern| !pattern.is_match(&name)) {
                continue;
            }
            let name = RefName::try_parse(&name)?;
            if let Some(reference) = self.read(&name)? {
                references.push(reference);
            }
        }

        Ok(references)
    }

    fn list_names(&self) -> Result<BTreeSet<String>> {
        let mut names: BTreeSet<String> = self.read_packed()?.names().map(String::from).collect();

        let refs_path = self.path.join(REFS_PREFIX);
        for entry in WalkDir::new(&refs_path).into_iter().filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_file() || entry.path().extension().is_some_and(|ext| ext == "lock")
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.path) else {
                continue;
            };
            if let Some(name) = relative.to_str() {
                names.insert(name.to_string());
            }
        }

        Ok(names)
    }

    fn glob_to_regex(glob: &str) -> Result<regex::Regex> {
        let mut pattern = String::from("^");
        let mut in_class = false;
        for c in glob.chars() {
            match c {
                '*' if !in_class => pattern.push_str(".*"),
                '?' if !in_class => pattern.push('.'),
                '[' if !in_class => {
                    in_class = true;
                    pattern.push('[');
                }
                ']' if in_class => {
                    in_class = false;
                    pattern.push(']');
                }
                '!' | '^' if in_class && pattern.ends_with('[') => pattern.push('^'),
                '-' if in_class => pattern.push('-'),
                '\\' | '[' | '&' | '~' if in_class => {
                    pattern.push('\\');
                    pattern.push(c);
                }
                _ if in_class => pattern.push(c),
                _ => pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        pattern.push('$');

        regex::Regex::new(&pattern)
            .map_err(|error| Error::invalid_argument(format!("invalid glob {glob:?}: {error}")))
    }

    /// Create a direct reference; fails if it exists unless `force` is set
    pub fn create_direct(
        &self,
        name: &str,
        oid: ObjectId,
        force: bool,
        log: Option<RefLogMessage>,
    ) -> Result<Reference> {
        let name = RefName::try_parse(name)?;
        let previous = self.prepare_create(&name, force)?;

        let target = RefTarget::Direct(oid);
        self.write_loose(&name, &target)?;
        let old = previous.and_then(|reference| reference.oid().copied());
        self.append_log(&name, old, Some(oid), log)?;
        tracing::debug!(reference = %name, %oid, "created reference");

        Ok(Reference::new(name, target))
    }

    /// Create a symbolic reference; the target does not need to exist
    pub fn create_symbolic(
        &self,
        name: &str,
        target: &str,
        force: bool,
        log: Option<RefLogMessage>,
    ) -> Result<Reference> {
        let name = RefName::try_parse(name)?;
        let target = RefTarget::Symbolic(RefName::try_parse(target)?);
        let previous = self.prepare_create(&name, force)?;

        self.write_loose(&name, &target)?;
        if log.is_some() {
            let old = previous.and_then(|reference| reference.oid().copied());
            let new = self.follow(&name)?.1;
            self.append_log(&name, old, new, log)?;
        }
        tracing::debug!(reference = %name, target = ?target, "created symbolic reference");

        Ok(Reference::new(name, target))
    }

    fn prepare_create(&self, name: &RefName, force: bool) -> Result<Option<Reference>> {
        let previous = self.read(name)?;
        if previous.is_some() && !force {
            return Err(Error::invalid_argument(format!("reference {name} already exists")));
        }
        if previous.is_none() {
            self.check_directory_conflicts(name)?;
        }

        Ok(previous)
    }

    /// `refs/heads/a` and `refs/heads/a/b` cannot coexist
    fn check_directory_conflicts(&self, name: &RefName) -> Result<()> {
        let children = format!("{name}/");
        for existing in self.list_names()? {
            let is_parent = name.as_str().starts_with(&format!("{existing}/"));
            if is_parent || existing.starts_with(&children) {
                return Err(Error::invalid_argument(format!(
                    "reference {name} conflicts with existing {existing}"
                )));
            }
        }

        Ok(())
    }

    /// Point the reference at the end of `name`'s symbolic chain to `new`
    ///
    /// When `expected_old` is given the current value must match it. The
    /// terminal reference is created if the chain ends at an unborn branch.
    pub fn update(
        &self,
        name: &str,
        new: ObjectId,
        expected_old: Option<ObjectId>,
        log: Option<RefLogMessage>,
    ) -> Result<()> {
        let name = RefName::try_parse(name)?;
        let (chain, old) = self.follow(&name)?;
        let Some(terminal) = chain.last() else {
            return Err(Error::invalid_argument("empty reference chain"));
        };

        if let Some(expected) = expected_old
            && old != Some(expected)
        {
            return Err(Error::invalid_argument(format!(
                "reference {terminal} is at {} but expected {expected}",
                old.map_or_else(|| String::from("nothing"), |oid| oid.to_string())
            )));
        }
        if old.is_none() {
            self.check_directory_conflicts(terminal)?;
        }

        self.write_loose(terminal, &RefTarget::Direct(new))?;
        for visited in &chain {
            self.append_log(visited, old, Some(new), log)?;
        }
        tracing::debug!(reference = %terminal, old = ?old, %new, "updated reference");

        Ok(())
    }

    /// Remove a reference (loose file, packed entry and reflog)
    pub fn delete(&self, name: &str, expected_old: Option<ObjectId>) -> Result<ObjectId> {
        let name = RefName::try_parse(name)?;
        let reference = self
            .read(&name)?
            .ok_or_else(|| Error::not_found(format!("reference {name}")))?;
        let current = match reference.target() {
            RefTarget::Direct(oid) => Some(*oid),
            RefTarget::Symbolic(_) => self.follow(&name)?.1,
        };

        if let Some(expected) = expected_old
            && current != Some(expected)
        {
            return Err(Error::invalid_argument(format!(
                "reference {name} does not point at {expected}"
            )));
        }

        let mut packed = self.read_packed()?;
        if packed.remove(name.as_str()).is_some() {
            let mut lock = Lockfile::acquire(self.packed_refs_path())?;
            lock.write_all(packed.serialize().as_bytes())?;
            lock.commit()?;
        }

        let path = self.ref_path(&name);
        if path.is_file() {
            std::fs::remove_file(&path)?;
            self.prune_empty_parent_dirs(&path, &self.path.join(REFS_PREFIX))?;
        }

        let log_path = self.log_path(&name);
        if log_path.is_file() {
            std::fs::remove_file(&log_path)?;
            self.prune_empty_parent_dirs(&log_path, &self.path.join(LOGS_DIR).join(REFS_PREFIX))?;
        }
        tracing::debug!(reference = %name, "deleted reference");

        current.ok_or_else(|| Error::not_found(format!("target of {name}")))
    }

    /// Reflog entries for `name`, oldest first
    pub fn reflog(&self, name: &str) -> Result<Vec<ReflogEntry>> {
        let name = RefName::try_parse(name)?;
        match std::fs::read_to_string(self.log_path(&name)) {
            Ok(content) => content.lines().map(ReflogEntry::parse).collect(),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn write_loose(&self, name: &RefName, target: &RefTarget) -> Result<()> {
        let mut lock = Lockfile::acquire(self.ref_path(name))?;
        lock.write_all(target.serialize().as_bytes())?;
        lock.commit()
    }

    fn append_log(
        &self,
        name: &RefName,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
        log: Option<RefLogMessage>,
    ) -> Result<()> {
        let Some(log) = log else {
            return Ok(());
        };

        let path = self.log_path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = ReflogEntry::new(old, new, log.committer.clone(), log.message);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?
            .write_all(entry.serialize().as_bytes())?;

        Ok(())
    }

    /// Remove emptied directories below `stop`, keeping its direct children (`refs/heads`)
    fn prune_empty_parent_dirs(&self, path: &Path, stop: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && parent.starts_with(stop)
            && parent.parent().is_some_and(|grandparent| grandparent != stop)
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent)?;
            self.prune_empty_parent_dirs(parent, stop)?;
        }

        Ok(())
    }
}
