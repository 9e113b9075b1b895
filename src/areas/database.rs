//! Object database: an ordered chain of storage backends
//!
//! Reads try primary backends by descending priority, then alternates in the
//! same order. Writes go to the highest-priority writable primary backend.
//! Every object read is re-hashed and checked against the requested id.

use crate::artifacts::database::backend::Backend;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::database::loose::LooseBackend;
use crate::artifacts::database::memory::MemoryBackend;
use crate::artifacts::database::pack::PackBackend;
use crate::artifacts::database::raw_object::{ObjectHeader, RawObject};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, Packable, Unpackable};
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use bstr::BString;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub const LOOSE_PRIORITY: i32 = 1;
pub const PACK_PRIORITY: i32 = 2;
/// Nesting limit for `info/alternates` chains
const MAX_ALTERNATE_DEPTH: usize = 5;
/// Peeling stops after this many tag hops
const MAX_PEEL_DEPTH: usize = 16;

#[derive(Debug, Clone)]
struct BackendSlot {
    backend: Arc<dyn Backend>,
    priority: i32,
    alternate: bool,
    sequence: usize,
}

#[derive(Debug)]
pub struct Database {
    objects_path: Option<Box<Path>>,
    backends: RwLock<Vec<BackendSlot>>,
    commit_cache: RwLock<HashMap<ObjectId, SlimCommit>>,
}

impl Database {
    /// Database with no backends; every read is `NotFound` until some are added
    pub fn empty() -> Self {
        Database {
            objects_path: None,
            backends: RwLock::new(Vec::new()),
            commit_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Scratch database kept in memory
    pub fn in_memory() -> Self {
        let database = Self::empty();
        database.add_backend(Arc::new(MemoryBackend::new()), LOOSE_PRIORITY);
        database
    }

    /// Database over an `objects` directory: loose objects, packs and the
    /// alternates listed in `info/alternates`
    pub fn new(objects_path: impl Into<PathBuf>) -> Result<Self> {
        let objects_path = objects_path.into();
        let mut database = Self::empty();

        database.add_backend(Arc::new(LooseBackend::new(&objects_path)), LOOSE_PRIORITY);
        database.add_backend(Arc::new(PackBackend::new(&objects_path)?), PACK_PRIORITY);
        database.load_alternates(&objects_path, 0)?;
        database.objects_path = Some(objects_path.into_boxed_path());

        Ok(database)
    }

    pub fn objects_path(&self) -> Option<&Path> {
        self.objects_path.as_deref()
    }

    pub fn add_backend(&self, backend: Arc<dyn Backend>, priority: i32) {
        self.push_slot(backend, priority, false);
    }

    /// Register a read-only fallback, consulted after every primary backend
    pub fn add_alternate(&self, backend: Arc<dyn Backend>, priority: i32) {
        self.push_slot(backend, priority, true);
    }

    /// Add another object directory (and its own alternates) as an alternate
    pub fn add_alternate_path(&self, objects_path: impl AsRef<Path>) -> Result<()> {
        self.add_alternate_path_at(objects_path.as_ref(), 0)
    }

    fn add_alternate_path_at(&self, objects_path: &Path, depth: usize) -> Result<()> {
        if depth > MAX_ALTERNATE_DEPTH {
            tracing::warn!(path = %objects_path.display(), "ignoring deeply nested alternate");
            return Ok(());
        }
        if !objects_path.is_dir() {
            tracing::warn!(path = %objects_path.display(), "alternate object directory is missing");
            return Ok(());
        }

        self.add_alternate(Arc::new(LooseBackend::new(objects_path)), LOOSE_PRIORITY);
        self.add_alternate(Arc::new(PackBackend::new(objects_path)?), PACK_PRIORITY);
        tracing::debug!(path = %objects_path.display(), "added alternate object directory");

        self.load_alternates(objects_path, depth + 1)
    }

    fn load_alternates(&self, objects_path: &Path, depth: usize) -> Result<()> {
        let alternates = match std::fs::read_to_string(objects_path.join("info").join("alternates"))
        {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        for line in alternates.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.add_alternate_path_at(&objects_path.join(line), depth)?;
        }

        Ok(())
    }

    fn push_slot(&self, backend: Arc<dyn Backend>, priority: i32, alternate: bool) {
        let mut backends = self.backends.write().unwrap_or_else(PoisonError::into_inner);
        let sequence = backends.len();
        tracing::debug!(backend = backend.name(), priority, alternate, "registered backend");

        backends.push(BackendSlot {
            backend,
            priority,
            alternate,
            sequence,
        });
        backends.sort_by_key(|slot| (slot.alternate, -slot.priority, slot.sequence));
    }

    /// Backends in lookup order
    fn chain(&self) -> Vec<BackendSlot> {
        self.backends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn refresh(&self) -> Result<()> {
        for slot in self.chain() {
            slot.backend.refresh()?;
        }
        Ok(())
    }

    pub fn read_raw(&self, oid: &ObjectId) -> Result<RawObject> {
        for slot in self.chain() {
            let Some(raw) = slot.backend.read(oid).map_err(|e| e.at_object(oid))? else {
                continue;
            };

            if raw.oid() != *oid {
                return Err(Error::corrupt_object(
                    oid,
                    format!("content hashes to {} in backend {}", raw.oid(), slot.backend.name()),
                ));
            }
            return Ok(raw);
        }

        Err(Error::object_not_found(oid))
    }

    /// Read and decode an object by its stored type
    pub fn read(&self, oid: &ObjectId) -> Result<ObjectBox> {
        let raw = self.read_raw(oid)?;
        ObjectBox::from_raw(&raw).map_err(|e| e.at_object(oid))
    }

    pub fn read_header(&self, oid: &ObjectId) -> Result<ObjectHeader> {
        for slot in self.chain() {
            if let Some(header) = slot.backend.read_header(oid).map_err(|e| e.at_object(oid))? {
                return Ok(header);
            }
        }

        Err(Error::object_not_found(oid))
    }

    pub fn exists(&self, oid: &ObjectId) -> Result<bool> {
        for slot in self.chain() {
            if slot.backend.exists(oid)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Id `data` would get once canonicalized as `object_type`, without storing it
    pub fn hash(&self, data: &[u8], object_type: ObjectType) -> Result<ObjectId> {
        Ok(Self::canonicalize(data, object_type)?.oid())
    }

    /// Canonicalize `data` as `object_type` and store it
    pub fn write(&self, data: &[u8], object_type: ObjectType) -> Result<ObjectId> {
        self.write_raw(&Self::canonicalize(data, object_type)?)
    }

    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        self.write_raw(&object.to_raw()?)
    }

    pub fn write_raw(&self, raw: &RawObject) -> Result<ObjectId> {
        let oid = raw.oid();
        if self.exists(&oid)? {
            return Ok(oid);
        }

        let slot = self
            .chain()
            .into_iter()
            .find(|slot| !slot.alternate && slot.backend.is_writable())
            .ok_or_else(|| Error::invalid_argument("no writable object backend"))?;

        slot.backend.write(raw)?;
        tracing::trace!(%oid, object_type = %raw.object_type, backend = slot.backend.name(), "stored object");

        Ok(oid)
    }

    fn canonicalize(data: &[u8], object_type: ObjectType) -> Result<RawObject> {
        let reader = Cursor::new(data);
        let payload = match object_type {
            ObjectType::Blob => Bytes::copy_from_slice(data),
            ObjectType::Tree => Tree::from_unsorted(reader)
                .and_then(|tree| tree.serialize())
                .map_err(Self::rejected_input)?,
            ObjectType::Commit => Commit::deserialize(reader)
                .and_then(|commit| commit.serialize())
                .map_err(Self::rejected_input)?,
            ObjectType::Tag => Tag::deserialize(reader)
                .and_then(|tag| tag.serialize())
                .map_err(Self::rejected_input)?,
        };

        Ok(RawObject::new(object_type, payload))
    }

    fn rejected_input(error: Error) -> Error {
        match error {
            Error::CorruptObject { reason, .. } => Error::invalid_argument(reason),
            other => other,
        }
    }

    fn read_typed(&self, oid: &ObjectId, expected: ObjectType) -> Result<RawObject> {
        let raw = self.read_raw(oid)?;
        if raw.object_type != expected {
            return Err(Error::invalid_argument(format!(
                "object {oid} is a {}, not a {expected}",
                raw.object_type
            )));
        }

        Ok(raw)
    }

    pub fn parse_object_as_blob(&self, oid: &ObjectId) -> Result<Blob> {
        let raw = self.read_typed(oid, ObjectType::Blob)?;
        Ok(Blob::new(raw.data))
    }

    pub fn parse_object_as_tree(&self, oid: &ObjectId) -> Result<Tree> {
        let raw = self.read_typed(oid, ObjectType::Tree)?;
        Tree::deserialize(Cursor::new(raw.data)).map_err(|e| e.at_object(oid))
    }

    pub fn parse_object_as_commit(&self, oid: &ObjectId) -> Result<Commit> {
        let raw = self.read_typed(oid, ObjectType::Commit)?;
        Commit::deserialize(Cursor::new(raw.data)).map_err(|e| e.at_object(oid))
    }

    pub fn parse_object_as_tag(&self, oid: &ObjectId) -> Result<Tag> {
        let raw = self.read_typed(oid, ObjectType::Tag)?;
        Tag::deserialize(Cursor::new(raw.data)).map_err(|e| e.at_object(oid))
    }

    /// Follow annotated tags until a non-tag object
    pub fn peel(&self, oid: &ObjectId) -> Result<(ObjectId, ObjectType)> {
        let mut current = *oid;

        for _ in 0..MAX_PEEL_DEPTH {
            let header = self.read_header(&current)?;
            if header.object_type != ObjectType::Tag {
                return Ok((current, header.object_type));
            }
            current = *self.parse_object_as_tag(&current)?.target();
        }

        Err(Error::invalid_argument(format!("tag chain from {oid} is too long")))
    }

    pub fn peel_to_commit(&self, oid: &ObjectId) -> Result<ObjectId> {
        match self.peel(oid)? {
            (commit, ObjectType::Commit) => Ok(commit),
            (other, object_type) => Err(Error::invalid_argument(format!(
                "{other} is a {object_type}, not a commit"
            ))),
        }
    }

    /// Tree of a tree-ish: a tree, a commit or a tag pointing at either
    pub fn peel_to_tree(&self, oid: &ObjectId) -> Result<ObjectId> {
        match self.peel(oid)? {
            (tree, ObjectType::Tree) => Ok(tree),
            (commit, ObjectType::Commit) => Ok(*self.parse_object_as_commit(&commit)?.tree_oid()),
            (other, object_type) => Err(Error::invalid_argument(format!(
                "{other} is a {object_type}, not a tree-ish"
            ))),
        }
    }

    /// Every stored id starting with `prefix`, sorted and deduplicated
    pub fn find_objects_by_prefix(&self, prefix: &ShortObjectId) -> Result<Vec<ObjectId>> {
        let mut matches = Vec::new();
        for slot in self.chain() {
            matches.extend(slot.backend.find_by_prefix(prefix)?);
        }
        matches.sort();
        matches.dedup();

        Ok(matches)
    }

    /// Expand an abbreviated id to the single object it names
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let prefix = ShortObjectId::try_parse(prefix)?;
        let matches = self.find_objects_by_prefix(&prefix)?;

        match matches.as_slice() {
            [] => Err(Error::not_found(format!("object {prefix}"))),
            [oid] => Ok(*oid),
            _ => Err(Error::invalid_argument(format!(
                "short object id {prefix} is ambiguous ({} candidates)",
                matches.len()
            ))),
        }
    }

    /// Parents and committer time of a commit, cached per database
    pub fn load_slim_commit(&self, oid: &ObjectId) -> Result<SlimCommit> {
        if let Some(cached) = self
            .commit_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(oid)
        {
            return Ok(cached.clone());
        }

        let commit = self.parse_object_as_commit(oid)?;
        let slim = SlimCommit::from_commit(*oid, &commit);
        self.commit_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*oid, slim.clone());

        Ok(slim)
    }

    /// Recursively list a tree's non-tree entries by full slash-separated path
    pub fn flatten_tree(&self, oid: &ObjectId) -> Result<BTreeMap<BString, DatabaseEntry>> {
        let mut entries = BTreeMap::new();
        self.flatten_into(oid, b"", &mut entries)?;
        Ok(entries)
    }

    fn flatten_into(
        &self,
        oid: &ObjectId,
        prefix: &[u8],
        entries: &mut BTreeMap<BString, DatabaseEntry>,
    ) -> Result<()> {
        for (name, entry) in self.parse_object_as_tree(oid)?.into_entries() {
            let path = if prefix.is_empty() {
                name
            } else {
                let mut path = BString::from(prefix);
                path.push(b'/');
                path.extend_from_slice(&name);
                path
            };

            if entry.is_tree() {
                self.flatten_into(&entry.oid, &path, entries)?;
            } else {
                entries.insert(path, entry);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::signature::Signature;
    use crate::errors::ErrorKind;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use std::io::Write;

    /// Backend answering every read with the same payload
    #[derive(Debug)]
    struct FixedBackend {
        raw: RawObject,
        prefix_matches: Vec<ObjectId>,
    }

    impl Backend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&self, _oid: &ObjectId) -> Result<Option<RawObject>> {
            Ok(Some(self.raw.clone()))
        }

        fn find_by_prefix(&self, _prefix: &ShortObjectId) -> Result<Vec<ObjectId>> {
            Ok(self.prefix_matches.clone())
        }
    }

    #[fixture]
    fn database() -> Database {
        Database::in_memory()
    }

    fn tree_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (name, content) in entries {
            write!(bytes, "100644 {name}\0").unwrap();
            ObjectId::hash(ObjectType::Blob, content.as_bytes())
                .write_to(&mut bytes)
                .unwrap();
        }
        bytes
    }

    #[rstest]
    fn write_then_read_round_trips(database: Database) {
        let oid = database.write(b"hello", ObjectType::Blob).unwrap();

        assert_eq!(oid.to_string(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert_eq!(database.write(b"hello", ObjectType::Blob).unwrap(), oid);
        assert_eq!(database.parse_object_as_blob(&oid).unwrap().content().as_ref(), b"hello");
        assert_eq!(
            database.read_header(&oid).unwrap(),
            ObjectHeader::new(ObjectType::Blob, 5)
        );
        assert!(database.exists(&oid).unwrap());
    }

    #[rstest]
    fn missing_objects_are_not_found(database: Database) {
        let oid = ObjectId::hash(ObjectType::Blob, b"absent");

        assert!(!database.exists(&oid).unwrap());
        assert_eq!(database.read(&oid).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(database.read_header(&oid).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[rstest]
    fn trees_are_sorted_before_hashing(database: Database) {
        let sorted = database
            .write(&tree_bytes(&[("a", "1"), ("b", "2")]), ObjectType::Tree)
            .unwrap();
        let unsorted = database
            .write(&tree_bytes(&[("b", "2"), ("a", "1")]), ObjectType::Tree)
            .unwrap();

        assert_eq!(sorted, unsorted);
    }

    #[rstest]
    fn malformed_structured_input_is_rejected(database: Database) {
        let error = database.write(b"not a commit", ObjectType::Commit).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn hash_mismatch_is_corrupt() {
        let database = Database::empty();
        database.add_backend(
            Arc::new(FixedBackend {
                raw: RawObject::new(ObjectType::Blob, Bytes::from_static(b"other")),
                prefix_matches: Vec::new(),
            }),
            LOOSE_PRIORITY,
        );

        let oid = ObjectId::hash(ObjectType::Blob, b"hello");
        let error = database.read(&oid).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::CorruptObject);
    }

    #[test]
    fn primaries_are_read_before_alternates() {
        let database = Database::empty();
        let alternate = Arc::new(MemoryBackend::new());
        let oid = alternate
            .write(&RawObject::new(ObjectType::Blob, Bytes::from_static(b"shared")))
            .unwrap();
        database.add_alternate(alternate, 100);

        // a primary holding a forged copy wins even at lower priority
        database.add_backend(
            Arc::new(FixedBackend {
                raw: RawObject::new(ObjectType::Blob, Bytes::from_static(b"forged")),
                prefix_matches: Vec::new(),
            }),
            0,
        );

        assert_eq!(database.read(&oid).unwrap_err().kind(), ErrorKind::CorruptObject);
    }

    #[test]
    fn writes_skip_alternates_and_read_only_backends() {
        let database = Database::empty();
        database.add_alternate(Arc::new(MemoryBackend::new()), 10);

        let error = database.write(b"x", ObjectType::Blob).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);

        let primary = Arc::new(MemoryBackend::new());
        database.add_backend(primary.clone(), 1);
        database.write(b"x", ObjectType::Blob).unwrap();
        assert_eq!(primary.len(), 1);
    }

    #[test]
    fn ambiguous_prefixes_are_rejected() {
        let database = Database::empty();
        let first = ObjectId::try_parse("abcd000000000000000000000000000000000001").unwrap();
        let second = ObjectId::try_parse("abcd000000000000000000000000000000000002").unwrap();
        database.add_backend(
            Arc::new(FixedBackend {
                raw: RawObject::new(ObjectType::Blob, Bytes::new()),
                prefix_matches: vec![second, first, second],
            }),
            1,
        );

        let prefix = ShortObjectId::try_parse("abcd").unwrap();
        assert_eq!(database.find_objects_by_prefix(&prefix).unwrap(), vec![first, second]);
        assert_eq!(
            database.resolve_prefix("abcd").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            database.resolve_prefix("abcd00000000000000000000000000000000000").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[rstest]
    fn peels_tags_and_commits_to_trees(database: Database) {
        let tree = database.store(&Tree::default()).unwrap();
        let signature = Signature::from_parts("A", "a@b", 1, 0).unwrap();
        let commit = database
            .store(&Commit::new(vec![], tree, signature.clone(), signature.clone(), "m\n".into()))
            .unwrap();
        let tag = database
            .store(&Tag::new(commit, ObjectType::Commit, "v1".into(), Some(signature), "t\n".into()))
            .unwrap();

        assert_eq!(database.peel_to_commit(&tag).unwrap(), commit);
        assert_eq!(database.peel_to_tree(&tag).unwrap(), tree);
        assert_eq!(
            database.peel_to_commit(&tree).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(database.load_slim_commit(&commit).unwrap().parents, vec![]);
    }

    #[rstest]
    fn trees_with_non_utf8_names_are_readable(database: Database) {
        let blob = database.write(b"content", ObjectType::Blob).unwrap();
        let mut inner_bytes = b"100644 men\xfc\0".to_vec();
        blob.write_to(&mut inner_bytes).unwrap();
        let inner = database.write(&inner_bytes, ObjectType::Tree).unwrap();
        let mut root_bytes = b"40000 caf\xe9\0".to_vec();
        inner.write_to(&mut root_bytes).unwrap();
        let root = database.write(&root_bytes, ObjectType::Tree).unwrap();

        let tree = database.parse_object_as_tree(&root).unwrap();
        assert_eq!(tree.serialize().unwrap(), root_bytes);
        let paths = database.flatten_tree(&root).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(paths, vec![BString::from(&b"caf\xe9/men\xfc"[..])]);
    }

    #[rstest]
    fn flattening_lists_nested_paths(database: Database) {
        let blob = database.write(b"content", ObjectType::Blob).unwrap();
        let file = DatabaseEntry::new(blob, EntryMode::File(FileMode::Regular));

        let mut inner = Tree::default();
        inner.insert("c.txt", file).unwrap();
        let inner = database.store(&inner).unwrap();

        let mut root = Tree::default();
        root.insert("a.txt", file).unwrap();
        root.insert("b", DatabaseEntry::new(inner, EntryMode::Directory)).unwrap();
        let root = database.store(&root).unwrap();

        let paths = database.flatten_tree(&root).unwrap().into_keys().collect::<Vec<_>>();
        assert_eq!(paths, vec!["a.txt", "b/c.txt"]);
    }

    #[test]
    fn on_disk_databases_follow_info_alternates() {
        let shared = TempDir::new().unwrap();
        let shared_db = Database::new(shared.path()).unwrap();
        let oid = shared_db.write(b"shared", ObjectType::Blob).unwrap();

        let local = TempDir::new().unwrap();
        std::fs::create_dir_all(local.path().join("info")).unwrap();
        std::fs::write(
            local.path().join("info").join("alternates"),
            format!("# shared store\n{}\n", shared.path().display()),
        )
        .unwrap();

        let database = Database::new(local.path()).unwrap();
        assert!(database.exists(&oid).unwrap());

        // writes still land in the local loose store
        let local_oid = database.write(b"local", ObjectType::Blob).unwrap();
        assert!(local.path().join(local_oid.to_path()).is_file());
        assert!(!shared.path().join(local_oid.to_path()).exists());
    }
}
