//! Git index (staging area)
//!
//! The index is Git's staging area that tracks which files should be included in the next commit.
//! It maintains metadata about files including their mode, timestamps, and SHA-1 hashes, and
//! during a merge it records unresolved paths at conflict stages 1-3.
//!
//! ## Invariants
//!
//! - Entries are sorted by (path bytes, stage)
//! - A path has either one stage-0 entry or any of stages 1-3, never both
//! - No stage-0 path is an ancestor directory of another stage-0 path
//!
//! ## Persistence
//!
//! Reads take a shared lock on the index file and verify its trailing checksum.
//! Writes go through `<index>.lock` and a rename, so readers see either the old
//! or the new file.

use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{ENTRY_FIXED_SIZE, EntryMetadata, IndexEntry, Stage};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{CHECKSUM_SIZE, HEADER_SIZE};
use crate::artifacts::objects::object::Packable;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::{Tree, TreeBuilder};
use crate::errors::{Error, Result};
use bstr::{BString, ByteSlice};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

const EXTENSION_HEADER_SIZE: usize = 8;

/// Size and mtime of the index file as last loaded or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(Some(FileStamp {
                modified: metadata.modified()?,
                len: metadata.len(),
            })),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

/// The three sides of an unresolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: BString,
    pub ancestor: Option<IndexEntry>,
    pub ours: Option<IndexEntry>,
    pub theirs: Option<IndexEntry>,
}

/// Git index (staging area)
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file; `None` for memory-only indexes
    path: Option<Box<Path>>,
    /// Entries sorted by (path, stage)
    entries: Vec<IndexEntry>,
    database: Option<Arc<Database>>,
    workspace: Option<Workspace>,
    /// File state at the last load or write
    stamp: Option<FileStamp>,
    /// Flag indicating if the index has been modified since loading
    changed: bool,
}

impl Index {
    /// Memory-only index, unbound to any object database
    pub fn in_memory() -> Self {
        Index {
            path: None,
            entries: Vec::new(),
            database: None,
            workspace: None,
            stamp: None,
            changed: false,
        }
    }

    /// Index backed by `path`; a missing file loads as empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut index = Index {
            path: Some(path.into().into_boxed_path()),
            ..Self::in_memory()
        };
        index.read(true)?;

        Ok(index)
    }

    /// Memory-only index holding `entries`, which may include conflict stages
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Result<Self> {
        let mut index = Self::in_memory();
        for entry in entries {
            index.add(entry)?;
        }

        Ok(index)
    }

    pub fn with_database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn database(&self) -> Option<&Arc<Database>> {
        self.database.as_ref()
    }

    fn require_database(&self) -> Result<&Arc<Database>> {
        self.database.as_ref().ok_or(Error::NoObjectDatabase)
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries from the index
    pub fn clear(&mut self) {
        self.entries.clear();
        self.changed = true;
    }

    /// Re-sync with the file on disk
    ///
    /// Without `force`, nothing happens when the file's size and mtime match
    /// the last load. Memory-only indexes are left untouched.
    pub fn read(&mut self, force: bool) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        let stamp = FileStamp::of(&path)?;
        if !force && stamp.is_some() && stamp == self.stamp {
            return Ok(());
        }

        let entries = match stamp {
            Some(_) => Self::load(&path)?,
            None => Vec::new(),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "read index");

        self.entries = entries;
        self.stamp = stamp;
        self.changed = false;

        Ok(())
    }

    fn load(path: &Path) -> Result<Vec<IndexEntry>> {
        let mut index_file = std::fs::File::open(path)?;
        let mut content = Vec::new();
        {
            let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;
            (*lock).read_to_end(&mut content)?;
        }

        if content.is_empty() {
            return Ok(Vec::new());
        }
        Self::parse(content)
    }

    fn parse(content: Vec<u8>) -> Result<Vec<IndexEntry>> {
        let total = content.len();
        let mut reader = Checksum::new(Cursor::new(content));

        let header = IndexHeader::parse(&reader.read(HEADER_SIZE)?)?;
        let fitting = total.saturating_sub(HEADER_SIZE + CHECKSUM_SIZE) / ENTRY_FIXED_SIZE;
        let mut entries: Vec<IndexEntry> =
            Vec::with_capacity((header.entries_count as usize).min(fitting));
        for _ in 0..header.entries_count {
            let previous_name = entries.last().map(|entry| entry.name.as_slice()).unwrap_or(b"");
            let entry = IndexEntry::deserialize(&mut reader, header.version, previous_name)?;

            if let Some(previous) = entries.last()
                && Self::sort_key(previous) >= Self::sort_key(&entry)
            {
                return Err(Error::corrupt_index(format!(
                    "entry {:?} is out of order",
                    entry.name
                )));
            }
            entries.push(entry);
        }

        Self::skip_extensions(&mut reader, total)?;
        reader.verify()?;

        Ok(entries)
    }

    fn skip_extensions(reader: &mut Checksum<Cursor<Vec<u8>>>, total: usize) -> Result<()> {
        loop {
            let position = reader.get_ref().position() as usize;
            let remaining = total.saturating_sub(position);
            if remaining <= CHECKSUM_SIZE {
                return Ok(());
            }
            if remaining < CHECKSUM_SIZE + EXTENSION_HEADER_SIZE {
                return Err(Error::corrupt_index("truncated extension header"));
            }

            let header = reader.read(EXTENSION_HEADER_SIZE)?;
            let signature = &header[..4];
            let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

            // lowercase-initial extensions change how entries must be read
            if !signature[0].is_ascii_uppercase() {
                return Err(Error::corrupt_index(format!(
                    "unsupported required extension {:?}",
                    String::from_utf8_lossy(signature)
                )));
            }
            if size > remaining - CHECKSUM_SIZE - EXTENSION_HEADER_SIZE {
                return Err(Error::corrupt_index("extension overruns the index file"));
            }

            reader.read(size)?;
            tracing::trace!(
                extension = %String::from_utf8_lossy(signature),
                size,
                "skipped index extension"
            );
        }
    }

    /// Persist all entries atomically
    pub fn write(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::invalid_argument("a memory-only index cannot be written"))?;

        let version = if self.entries.iter().any(IndexEntry::has_extended_flags) {
            3
        } else {
            2
        };

        let mut lock = Lockfile::acquire(path.to_path_buf())?;
        {
            let mut writer = Checksum::new(&mut lock);
            writer.write(&IndexHeader::new(version, self.entries.len() as u32).serialize()?)?;
            for entry in &self.entries {
                writer.write(&entry.serialize()?)?;
            }
            writer.write_checksum()?;
        }
        lock.commit()?;

        self.stamp = FileStamp::of(&path)?;
        self.changed = false;
        tracing::debug!(path = %path.display(), entries = self.entries.len(), version, "wrote index");

        Ok(())
    }

    fn sort_key(entry: &IndexEntry) -> (&[u8], Stage) {
        (entry.name.as_bytes(), entry.stage)
    }

    fn search(&self, path: &[u8], stage: Stage) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| Self::sort_key(entry).cmp(&(path, stage)))
    }

    /// Insert or replace an entry, keeping every invariant
    ///
    /// A stage-0 entry evicts conflict stages for its path and any entries it
    /// collides with as a file/directory pair. A conflict-stage entry evicts the
    /// stage-0 entry for its path.
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        Self::validate_path(&entry.name)?;

        if entry.stage.is_conflict() {
            self.remove(&entry.name, Some(Stage::Normal));
        } else {
            self.discard_conflicts(&entry);
        }

        match self.search(&entry.name, entry.stage) {
            Ok(position) => self.entries[position] = entry,
            Err(position) => self.entries.insert(position, entry),
        }
        self.changed = true;

        Ok(())
    }

    fn validate_path(path: &[u8]) -> Result<()> {
        if path.is_empty()
            || path.contains(&0)
            || path
                .split_str("/")
                .any(|component| component.is_empty() || component == b"." || component == b"..")
        {
            return Err(Error::invalid_argument(format!(
                "invalid index path {:?}",
                path.as_bstr()
            )));
        }

        Ok(())
    }

    /// Remove parent directories that are file entries, and entries below the
    /// new path when it turns a directory into a file
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        let parents = entry.parent_dirs();
        let mut children = entry.name.clone();
        children.push(b'/');
        let name = entry.name.as_bstr();

        self.entries.retain(|existing| {
            let collides = parents.contains(&existing.name.as_bstr())
                || existing.name.starts_with(&children)
                || (existing.name.as_bstr() == name && existing.stage.is_conflict());
            !collides
        });
    }

    /// Stage the working-tree file at `path` as a blob
    pub fn add_by_path(&mut self, path: &str) -> Result<()> {
        let database = Arc::clone(self.require_database()?);
        let workspace = self
            .workspace
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("index has no working directory"))?;

        let absolute = workspace.resolve(path)?;
        let stat = workspace.stat(path)?;
        let metadata = EntryMetadata::from_stat(&absolute, &stat);

        let content = match metadata.mode {
            EntryMode::Symlink => workspace.read_link(path)?,
            EntryMode::File(_) => workspace.read_file(path)?,
            EntryMode::Directory | EntryMode::Gitlink => {
                return Err(Error::invalid_argument(format!("{path:?} is a directory")));
            }
        };
        let oid = database.write(&content, ObjectType::Blob)?;
        tracing::trace!(path, %oid, mode = %metadata.mode, "staged path");

        self.add(IndexEntry::new(path, oid, metadata))
    }

    /// Remove `path` at `stage`, or at every stage when `None`; returns how
    /// many entries went away
    pub fn remove(&mut self, path: impl AsRef<[u8]>, stage: Option<Stage>) -> usize {
        let path = path.as_ref();
        let before = self.entries.len();
        self.entries.retain(|entry| {
            entry.name.as_slice() != path || stage.is_some_and(|stage| stage != entry.stage)
        });

        let removed = before - self.entries.len();
        if removed > 0 {
            self.changed = true;
        }
        removed
    }

    /// Position of the lowest-stage entry for `path`
    pub fn find(&self, path: impl AsRef<[u8]>) -> Result<usize> {
        let path = path.as_ref();
        let position = match self.search(path, Stage::Normal) {
            Ok(position) | Err(position) => position,
        };

        match self.entries.get(position) {
            Some(entry) if entry.name.as_slice() == path => Ok(position),
            _ => Err(Error::not_found(format!("path {} in index", path.as_bstr()))),
        }
    }

    pub fn get(&self, path: impl AsRef<[u8]>, stage: Stage) -> Option<&IndexEntry> {
        self.search(path.as_ref(), stage)
            .ok()
            .map(|position| &self.entries[position])
    }

    pub fn entry_at(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|entry| entry.stage.is_conflict())
    }

    /// Unresolved paths, grouped with their stages
    pub fn conflicts(&self) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = Vec::new();

        for entry in self.entries.iter().filter(|entry| entry.stage.is_conflict()) {
            if conflicts.last().is_none_or(|conflict| conflict.path != entry.name) {
                conflicts.push(Conflict {
                    path: entry.name.clone(),
                    ancestor: None,
                    ours: None,
                    theirs: None,
                });
            }

            if let Some(conflict) = conflicts.last_mut() {
                let slot = match entry.stage {
                    Stage::Ancestor => &mut conflict.ancestor,
                    Stage::Ours => &mut conflict.ours,
                    Stage::Theirs | Stage::Normal => &mut conflict.theirs,
                };
                *slot = Some(entry.clone());
            }
        }

        conflicts
    }

    /// Write the tree hierarchy described by the entries and return the root id
    pub fn create_tree(&self) -> Result<ObjectId> {
        let database = self.require_database()?;

        let unmerged = self.conflicts().len();
        if unmerged > 0 {
            return Err(Error::UnmergedEntries { count: unmerged });
        }

        let mut builder = TreeBuilder::default();
        for entry in &self.entries {
            builder.insert(&entry.name, DatabaseEntry::new(entry.oid, entry.mode()))?;
        }

        let root = builder.write(&mut |tree: &Tree| database.store(tree))?;
        tracing::debug!(%root, entries = self.entries.len(), "created tree from index");

        Ok(root)
    }

    /// Replace the contents with the flattened entries of a tree
    pub fn read_tree(&mut self, tree_oid: &ObjectId) -> Result<()> {
        let flattened = self.require_database()?.flatten_tree(tree_oid)?;

        // flattened paths are already in index order
        self.entries = flattened
            .into_iter()
            .map(|(path, entry)| IndexEntry::from_tree_entry(path, entry.oid, entry.mode))
            .collect();
        self.changed = true;

        Ok(())
    }
}
