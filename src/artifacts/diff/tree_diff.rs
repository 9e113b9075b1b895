use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::pathspec::Pathspec;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use bstr::{BStr, BString, ByteSlice};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaStatus {
    Added,
    Deleted,
    Modified,
    /// Same path, different kind of entry (file, symlink or gitlink)
    TypeChanged,
}

impl DeltaStatus {
    /// Letter used by `git diff --name-status`
    pub fn as_char(&self) -> char {
        match self {
            DeltaStatus::Added => 'A',
            DeltaStatus::Deleted => 'D',
            DeltaStatus::Modified => 'M',
            DeltaStatus::TypeChanged => 'T',
        }
    }
}

/// One changed non-tree path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffDelta {
    pub status: DeltaStatus,
    pub path: BString,
    pub old: Option<DatabaseEntry>,
    pub new: Option<DatabaseEntry>,
}

impl DiffDelta {
    fn classify(path: BString, old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        let status = match (&old, &new) {
            (None, None) => return None,
            (None, Some(_)) => DeltaStatus::Added,
            (Some(_), None) => DeltaStatus::Deleted,
            (Some(old), Some(new)) if old == new => return None,
            (Some(old), Some(new)) if kind(old.mode) == kind(new.mode) => DeltaStatus::Modified,
            (Some(_), Some(_)) => DeltaStatus::TypeChanged,
        };

        Some(DiffDelta {
            status,
            path,
            old,
            new,
        })
    }

    /// The same change seen from the other side
    pub fn reversed(&self) -> Self {
        let status = match self.status {
            DeltaStatus::Added => DeltaStatus::Deleted,
            DeltaStatus::Deleted => DeltaStatus::Added,
            other => other,
        };

        DiffDelta {
            status,
            path: self.path.clone(),
            old: self.new,
            new: self.old,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Symlink,
    Gitlink,
    Tree,
}

fn kind(mode: EntryMode) -> EntryKind {
    match mode {
        EntryMode::File(_) => EntryKind::File,
        EntryMode::Symlink => EntryKind::Symlink,
        EntryMode::Gitlink => EntryKind::Gitlink,
        EntryMode::Directory => EntryKind::Tree,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Path prefixes to restrict the output to; empty means everything
    pub pathspec: Vec<String>,
}

pub type TreeEntryMap = BTreeMap<BString, DatabaseEntry>;

fn join_path(prefix: &[u8], name: &BStr) -> BString {
    if prefix.is_empty() {
        return name.to_owned();
    }

    let mut path = BString::from(prefix);
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

/// Recursive comparison of two trees
///
/// Both trees are walked name by name. Matching subtrees with equal ids are
/// skipped without being loaded. A path that is a tree on one side and not on
/// the other is reported as a deletion plus the additions below it.
#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    pathspec: Pathspec,
    deltas: Vec<DiffDelta>,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database, options: &DiffOptions) -> Self {
        TreeDiff {
            database,
            pathspec: Pathspec::new(&options.pathspec),
            deltas: Vec::new(),
        }
    }

    /// Deltas found so far, ordered by path bytes
    pub fn into_deltas(mut self) -> Vec<DiffDelta> {
        sort_deltas(&mut self.deltas);
        self.deltas
    }

    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        prefix: &[u8],
    ) -> Result<()> {
        if old == new {
            return Ok(());
        }

        let old_entries = self.load_entries(old)?;
        let new_entries = self.load_entries(new)?;

        let names: BTreeSet<&BString> = old_entries.keys().chain(new_entries.keys()).collect();
        for name in names {
            let path = join_path(prefix, name.as_bstr());
            self.compare_entries(old_entries.get(name), new_entries.get(name), path)?;
        }

        Ok(())
    }

    fn compare_entries(
        &mut self,
        old: Option<&DatabaseEntry>,
        new: Option<&DatabaseEntry>,
        path: BString,
    ) -> Result<()> {
        if old == new {
            return Ok(());
        }

        let subtree = |entry: Option<&DatabaseEntry>| entry.filter(|e| e.is_tree()).map(|e| e.oid);
        let (old_tree, new_tree) = (subtree(old), subtree(new));

        if (old_tree.is_some() || new_tree.is_some()) && self.pathspec.may_contain(&path) {
            self.compare_oids(old_tree.as_ref(), new_tree.as_ref(), &path)?;
        }

        let leaf = |entry: Option<&DatabaseEntry>| entry.filter(|e| !e.is_tree()).copied();
        if self.pathspec.matches(&path)
            && let Some(delta) = DiffDelta::classify(path, leaf(old), leaf(new))
        {
            self.deltas.push(delta);
        }

        Ok(())
    }

    fn load_entries(&self, oid: Option<&ObjectId>) -> Result<TreeEntryMap> {
        match oid {
            None => Ok(BTreeMap::new()),
            Some(oid) => Ok(self.database.parse_object_as_tree(oid)?.into_entries().collect()),
        }
    }
}

/// Compare two flattened listings, keyed by full path
pub fn diff_flat(old: &TreeEntryMap, new: &TreeEntryMap, options: &DiffOptions) -> Vec<DiffDelta> {
    let pathspec = Pathspec::new(&options.pathspec);
    let names: BTreeSet<&BString> = old.keys().chain(new.keys()).collect();

    let mut deltas: Vec<DiffDelta> = names
        .into_iter()
        .filter(|path| pathspec.matches(path))
        .filter_map(|path| DiffDelta::classify(path.clone(), old.get(path).copied(), new.get(path).copied()))
        .collect();
    sort_deltas(&mut deltas);

    deltas
}

/// Compare a tree (or nothing) with the resolved entries of an index
pub fn diff_tree_to_index<'i>(
    database: &Database,
    tree: Option<&ObjectId>,
    entries: impl IntoIterator<Item = &'i IndexEntry>,
    options: &DiffOptions,
) -> Result<Vec<DiffDelta>> {
    let old = match tree {
        Some(tree) => database.flatten_tree(tree)?,
        None => BTreeMap::new(),
    };
    let new: TreeEntryMap = entries
        .into_iter()
        .filter(|entry| entry.stage == Stage::Normal)
        .map(|entry| (entry.name.clone(), DatabaseEntry::new(entry.oid, entry.mode())))
        .collect();

    Ok(diff_flat(&old, &new, options))
}

fn sort_deltas(deltas: &mut [DiffDelta]) {
    deltas.sort_by(|a, b| a.path.cmp(&b.path));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::objects::object_type::ObjectType;
    use crate::artifacts::objects::tree::{Tree, TreeBuilder};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const REGULAR: EntryMode = EntryMode::File(FileMode::Regular);
    const EXECUTABLE: EntryMode = EntryMode::File(FileMode::Executable);

    #[fixture]
    fn database() -> Database {
        Database::in_memory()
    }

    fn blob(database: &Database, content: &str) -> ObjectId {
        database.write(content.as_bytes(), ObjectType::Blob).unwrap()
    }

    fn tree(database: &Database, files: &[(&str, &str, EntryMode)]) -> ObjectId {
        let mut builder = TreeBuilder::default();
        for (path, content, mode) in files {
            builder
                .insert(path, DatabaseEntry::new(blob(database, content), *mode))
                .unwrap();
        }
        builder.write(&mut |tree: &Tree| database.store(tree)).unwrap()
    }

    fn diff(database: &Database, old: &ObjectId, new: &ObjectId, pathspec: &[&str]) -> Vec<(char, String)> {
        let options = DiffOptions {
            pathspec: pathspec.iter().map(|p| p.to_string()).collect(),
        };
        let mut tree_diff = TreeDiff::new(database, &options);
        tree_diff.compare_oids(Some(old), Some(new), b"").unwrap();

        tree_diff
            .into_deltas()
            .into_iter()
            .map(|delta| (delta.status.as_char(), delta.path.to_string()))
            .collect()
    }

    fn status(entries: &[(char, &str)]) -> Vec<(char, String)> {
        entries.iter().map(|(c, p)| (*c, p.to_string())).collect()
    }

    #[rstest]
    fn reports_added_deleted_and_modified_files(database: Database) {
        let old = tree(
            &database,
            &[("a.txt", "a", REGULAR), ("dir/b.txt", "b", REGULAR), ("gone.txt", "x", REGULAR)],
        );
        let new = tree(
            &database,
            &[("a.txt", "changed", REGULAR), ("dir/b.txt", "b", REGULAR), ("dir/c.txt", "c", REGULAR)],
        );

        assert_eq!(
            diff(&database, &old, &new, &[]),
            status(&[('M', "a.txt"), ('A', "dir/c.txt"), ('D', "gone.txt")])
        );
    }

    #[rstest]
    fn mode_changes_within_files_are_modifications(database: Database) {
        let old = tree(&database, &[("run.sh", "#!/bin/sh", REGULAR)]);
        let new = tree(&database, &[("run.sh", "#!/bin/sh", EXECUTABLE)]);

        assert_eq!(diff(&database, &old, &new, &[]), status(&[('M', "run.sh")]));
    }

    #[rstest]
    fn file_to_symlink_is_a_type_change(database: Database) {
        let old = tree(&database, &[("link", "target", REGULAR)]);
        let new = tree(&database, &[("link", "target", EntryMode::Symlink)]);

        assert_eq!(diff(&database, &old, &new, &[]), status(&[('T', "link")]));
    }

    #[rstest]
    fn file_replaced_by_directory_is_a_delete_and_an_add(database: Database) {
        let old = tree(&database, &[("a", "file", REGULAR), ("z", "z", REGULAR)]);
        let new = tree(&database, &[("a/inner", "nested", REGULAR), ("z", "z", REGULAR)]);

        assert_eq!(
            diff(&database, &old, &new, &[]),
            status(&[('D', "a"), ('A', "a/inner")])
        );
        assert_eq!(
            diff(&database, &new, &old, &[]),
            status(&[('A', "a"), ('D', "a/inner")])
        );
    }

    #[rstest]
    fn pathspec_limits_the_output(database: Database) {
        let old = tree(&database, &[("src/a.rs", "a", REGULAR), ("docs/x.md", "x", REGULAR)]);
        let new = tree(&database, &[("src/a.rs", "b", REGULAR), ("docs/x.md", "y", REGULAR)]);

        assert_eq!(diff(&database, &old, &new, &["src"]), status(&[('M', "src/a.rs")]));
        assert_eq!(diff(&database, &old, &new, &["nope"]), vec![]);
    }

    #[rstest]
    fn identical_trees_have_no_deltas(database: Database) {
        let old = tree(&database, &[("a", "a", REGULAR)]);
        assert_eq!(diff(&database, &old, &old, &[]), vec![]);
    }

    #[rstest]
    fn swapping_sides_swaps_roles(database: Database) {
        let old = tree(&database, &[("a", "1", REGULAR), ("b", "2", REGULAR)]);
        let new = tree(&database, &[("b", "3", REGULAR), ("c", "4", REGULAR)]);

        let mut forward = TreeDiff::new(&database, &DiffOptions::default());
        forward.compare_oids(Some(&old), Some(&new), b"").unwrap();
        let mut backward = TreeDiff::new(&database, &DiffOptions::default());
        backward.compare_oids(Some(&new), Some(&old), b"").unwrap();

        let reversed: Vec<DiffDelta> = forward.into_deltas().iter().map(DiffDelta::reversed).collect();
        assert_eq!(reversed, backward.into_deltas());
    }

    #[rstest]
    fn compares_a_tree_with_index_entries(database: Database) {
        let old = tree(&database, &[("a", "1", REGULAR), ("b", "2", REGULAR)]);
        let entries = vec![
            IndexEntry::from_tree_entry("a", blob(&database, "1"), REGULAR),
            IndexEntry::from_tree_entry("c", blob(&database, "3"), REGULAR),
            IndexEntry::from_tree_entry("d", blob(&database, "4"), REGULAR).with_stage(Stage::Ours),
        ];

        let deltas = diff_tree_to_index(&database, Some(&old), &entries, &DiffOptions::default()).unwrap();

        let statuses: Vec<(char, String)> = deltas
            .into_iter()
            .map(|d| (d.status.as_char(), d.path.to_string()))
            .collect();
        assert_eq!(statuses, status(&[('D', "b"), ('A', "c")]));
    }

    #[rstest]
    fn non_utf8_paths_keep_their_bytes(database: Database) {
        let name = &b"caf\xe9/men\xfc"[..];
        let tree_with = |content: &str| {
            let mut builder = TreeBuilder::default();
            builder
                .insert(name, DatabaseEntry::new(blob(&database, content), REGULAR))
                .unwrap();
            builder.write(&mut |tree: &Tree| database.store(tree)).unwrap()
        };
        let (old, new) = (tree_with("1"), tree_with("2"));

        let mut tree_diff = TreeDiff::new(&database, &DiffOptions::default());
        tree_diff.compare_oids(Some(&old), Some(&new), b"").unwrap();
        let deltas = tree_diff.into_deltas();

        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].status, DeltaStatus::Modified);
        assert_eq!(deltas[0].path.as_slice(), name);
    }
}
