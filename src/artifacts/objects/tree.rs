//! Git tree object
//!
//! Trees represent directory snapshots in Git. They contain entries for files (blobs),
//! symlinks, submodules and subdirectories (other trees), along with their names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! ## Ordering
//!
//! Entries are sorted byte-wise by name, where a directory sorts as if its name had a
//! trailing `/`. Entries are kept in a map keyed by that sort key, so iteration order
//! is the on-disk order and re-encoding a decoded tree reproduces the same bytes.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bstr::{BStr, BString, ByteSlice};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// Sort key of a tree entry: directories get a trailing '/'
fn sort_key(name: &[u8], mode: &EntryMode) -> BString {
    if mode.is_tree() {
        with_slash(name)
    } else {
        BString::from(name)
    }
}

fn with_slash(name: &[u8]) -> BString {
    let mut key = BString::from(name);
    key.push(b'/');
    key
}

/// Name of an entry from its sort key
fn plain_name(key: &BStr) -> &BStr {
    key.strip_suffix(b"/").unwrap_or(key.as_bytes()).as_bstr()
}

/// Check a single path component stored in a tree
///
/// Names are arbitrary bytes apart from `/` and NUL.
pub fn validate_entry_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') || name.contains(&0) {
        return Err(Error::invalid_argument(format!(
            "invalid tree entry name {:?}",
            name.as_bstr()
        )));
    }

    Ok(())
}

/// Git tree object representing a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<BString, DatabaseEntry>,
}

impl Tree {
    /// Insert an entry, rejecting invalid names and duplicates
    pub fn insert(&mut self, name: impl AsRef<[u8]>, entry: DatabaseEntry) -> Result<()> {
        let name = name.as_ref();
        validate_entry_name(name)?;

        let key = sort_key(name, &entry.mode);
        let twin = if entry.mode.is_tree() {
            BString::from(name)
        } else {
            with_slash(name)
        };
        if self.entries.contains_key(&key) || self.entries.contains_key(&twin) {
            return Err(Error::invalid_argument(format!(
                "duplicate tree entry {:?}",
                name.as_bstr()
            )));
        }

        self.entries.insert(key, entry);
        Ok(())
    }

    /// Entries in on-disk order, with plain names
    pub fn entries(&self) -> impl Iterator<Item = (&BStr, &DatabaseEntry)> {
        self.entries
            .iter()
            .map(|(key, entry)| (plain_name(key.as_bstr()), entry))
    }

    pub fn into_entries(self) -> impl Iterator<Item = (BString, DatabaseEntry)> {
        self.entries.into_iter().map(|(mut key, entry)| {
            if entry.is_tree() {
                key.pop();
            }
            (key, entry)
        })
    }

    pub fn get(&self, name: impl AsRef<[u8]>) -> Option<&DatabaseEntry> {
        let name = name.as_ref();
        self.entries
            .get(name.as_bstr())
            .or_else(|| self.entries.get(with_slash(name).as_bstr()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> Result<Bytes> {
        let mut content = Vec::new();

        for (name, entry) in self.entries() {
            write!(content, "{} ", entry.mode.as_str())?;
            content.extend_from_slice(name);
            content.push(0);
            entry.oid.write_to(&mut content)?;
        }

        Ok(content.into())
    }
}

/// Decode raw `mode name\0oid` records without checking their order
fn read_entries(mut reader: impl BufRead) -> Result<Vec<(BString, DatabaseEntry)>> {
    let mut entries = Vec::new();

    // Reuse scratch buffers to reduce allocs
    let mut mode_bytes = Vec::new();
    let mut name_bytes = Vec::new();

    loop {
        mode_bytes.clear();
        // Read "mode " (space-delimited)
        let n = reader.read_until(b' ', &mut mode_bytes)?;
        if n == 0 {
            break; // clean EOF: no more entries
        }
        if mode_bytes.pop() != Some(b' ') {
            return Err(Error::malformed("unexpected end of tree in mode"));
        }

        let mode = std::str::from_utf8(&mode_bytes)
            .map_err(|_| Error::malformed("tree entry mode is not ASCII"))
            .and_then(EntryMode::from_octal_str)?;

        name_bytes.clear();
        reader.read_until(b'\0', &mut name_bytes)?;
        if name_bytes.pop() != Some(b'\0') {
            return Err(Error::malformed("unexpected end of tree in name"));
        }
        let name = name_bytes.as_bstr();
        validate_entry_name(name).map_err(|error| Error::malformed(error.to_string()))?;

        let oid = ObjectId::read_from(&mut reader)
            .map_err(|_| Error::malformed(format!("truncated object id for entry {name:?}")))?;

        entries.push((BString::from(name), DatabaseEntry::new(oid, mode)));
    }

    Ok(entries)
}

impl Tree {
    /// Decode a tree whose entries may be in any order, sorting them
    ///
    /// Duplicate names are still rejected.
    pub fn from_unsorted(reader: impl BufRead) -> Result<Self> {
        let mut tree = Tree::default();
        for (name, entry) in read_entries(reader)? {
            tree.insert(&name, entry)?;
        }

        Ok(tree)
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut previous_key: Option<BString> = None;

        for (name, entry) in read_entries(reader)? {
            let key = sort_key(&name, &entry.mode);
            let twin = if entry.mode.is_tree() {
                name.clone()
            } else {
                with_slash(&name)
            };
            if entries.contains_key(&twin)
                || previous_key.as_ref().is_some_and(|previous| *previous >= key)
            {
                return Err(Error::malformed(format!(
                    "tree entries out of order or duplicated at {name:?}"
                )));
            }

            previous_key = Some(key.clone());
            entries.insert(key, entry);
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries()
            .map(|(name, entry)| {
                format!(
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.mode.object_type(),
                    entry.oid,
                    name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

#[derive(Debug, Clone)]
enum BuilderEntry {
    Leaf(DatabaseEntry),
    Directory(TreeBuilder),
}

/// Builds a hierarchy of trees from slash-separated paths
///
/// Subtrees are written before their parents (post-order), since a parent's
/// content embeds the ids of its children.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<BString, BuilderEntry>,
}

impl TreeBuilder {
    pub fn insert(&mut self, path: impl AsRef<[u8]>, entry: DatabaseEntry) -> Result<()> {
        let path = path.as_ref();
        match path.split_once_str("/") {
            None => {
                validate_entry_name(path)?;
                if self.entries.contains_key(path.as_bstr())
                    || self.entries.contains_key(with_slash(path).as_bstr())
                {
                    return Err(Error::invalid_argument(format!(
                        "path {:?} is already present",
                        path.as_bstr()
                    )));
                }
                self.entries
                    .insert(sort_key(path, &entry.mode), BuilderEntry::Leaf(entry));
            }
            Some((parent, rest)) => {
                validate_entry_name(parent)?;
                if self.entries.contains_key(parent.as_bstr()) {
                    return Err(Error::invalid_argument(format!(
                        "{:?} is both a file and a directory",
                        parent.as_bstr()
                    )));
                }

                match self
                    .entries
                    .entry(with_slash(parent))
                    .or_insert_with(|| BuilderEntry::Directory(TreeBuilder::default()))
                {
                    BuilderEntry::Directory(subtree) => subtree.insert(rest, entry)?,
                    BuilderEntry::Leaf(_) => {
                        return Err(Error::invalid_argument(format!(
                            "{:?} is already recorded as a subtree id",
                            parent.as_bstr()
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every tree through `store`, innermost first, returning the root id
    pub fn write<F>(&self, store: &mut F) -> Result<ObjectId>
    where
        F: FnMut(&Tree) -> Result<ObjectId>,
    {
        let mut tree = Tree::default();

        for (key, entry) in &self.entries {
            let name = plain_name(key.as_bstr());
            match entry {
                BuilderEntry::Leaf(leaf) => tree.insert(name, *leaf)?,
                BuilderEntry::Directory(subtree) => {
                    let oid = subtree.write(store)?;
                    tree.insert(name, DatabaseEntry::new(oid, EntryMode::Directory))?
                }
            }
        }

        store(&tree)
    }
}
