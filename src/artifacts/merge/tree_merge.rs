use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::merge::file_merge::{FileFavor, merge_file};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::Result;
use bstr::{BStr, BString, ByteSlice};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub favor: FileFavor,
}

/// Which side a cleanly resolved entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Clean(DatabaseEntry, Side),
    Conflict {
        ancestor: Option<DatabaseEntry>,
        ours: Option<DatabaseEntry>,
        theirs: Option<DatabaseEntry>,
    },
}

/// Three-way merge of flattened trees into an index
///
/// Conflicts never abort the merge; they are recorded at stages 1-3.
#[derive(Debug)]
pub struct TreeMerge<'d> {
    database: &'d Arc<Database>,
    options: MergeOptions,
}

impl<'d> TreeMerge<'d> {
    pub fn new(database: &'d Arc<Database>, options: MergeOptions) -> Self {
        TreeMerge { database, options }
    }

    pub fn merge(
        &self,
        ancestor: Option<&ObjectId>,
        ours: &ObjectId,
        theirs: &ObjectId,
    ) -> Result<Index> {
        let ancestor = match ancestor {
            Some(tree) => self.database.flatten_tree(tree)?,
            None => BTreeMap::new(),
        };
        let ours = self.database.flatten_tree(ours)?;
        let theirs = self.database.flatten_tree(theirs)?;

        let paths: BTreeSet<&BString> = ancestor.keys().chain(ours.keys()).chain(theirs.keys()).collect();
        let mut resolutions = BTreeMap::new();
        for path in paths {
            let resolution = self.resolve_path(
                ancestor.get(path).copied(),
                ours.get(path).copied(),
                theirs.get(path).copied(),
            )?;
            if let Some(resolution) = resolution {
                resolutions.insert(path.clone(), resolution);
            }
        }

        let index = self.build_index(resolutions)?;
        tracing::debug!(
            entries = index.len(),
            conflicts = index.conflicts().len(),
            favor = ?self.options.favor,
            "merged trees"
        );

        Ok(index)
    }

    fn resolve_path(
        &self,
        ancestor: Option<DatabaseEntry>,
        ours: Option<DatabaseEntry>,
        theirs: Option<DatabaseEntry>,
    ) -> Result<Option<Resolution>> {
        if ours == theirs {
            return Ok(ours.map(|entry| Resolution::Clean(entry, Side::Both)));
        }
        if ours == ancestor {
            return Ok(theirs.map(|entry| Resolution::Clean(entry, Side::Theirs)));
        }
        if theirs == ancestor {
            return Ok(ours.map(|entry| Resolution::Clean(entry, Side::Ours)));
        }

        match (ours, theirs) {
            (Some(ours), Some(theirs)) => self.merge_entries(ancestor, ours, theirs).map(Some),
            _ => Ok(self.favored(ours, theirs).unwrap_or(Some(Resolution::Conflict {
                ancestor,
                ours,
                theirs,
            }))),
        }
    }

    /// Outcome an `Ours`/`Theirs` favor picks, where `Some(None)` is a deletion;
    /// `None` keeps the conflict
    fn favored(
        &self,
        ours: Option<DatabaseEntry>,
        theirs: Option<DatabaseEntry>,
    ) -> Option<Option<Resolution>> {
        match self.options.favor {
            FileFavor::Ours => Some(ours.map(|entry| Resolution::Clean(entry, Side::Ours))),
            FileFavor::Theirs => Some(theirs.map(|entry| Resolution::Clean(entry, Side::Theirs))),
            FileFavor::Normal | FileFavor::Union => None,
        }
    }

    fn merge_entries(
        &self,
        ancestor: Option<DatabaseEntry>,
        ours: DatabaseEntry,
        theirs: DatabaseEntry,
    ) -> Result<Resolution> {
        let conflict = Resolution::Conflict {
            ancestor,
            ours: Some(ours),
            theirs: Some(theirs),
        };

        let mergeable = ours.mode.is_file()
            && theirs.mode.is_file()
            && ancestor.is_none_or(|ancestor| ancestor.mode.is_file());
        if !mergeable {
            return Ok(self.favored(Some(ours), Some(theirs)).flatten().unwrap_or(conflict));
        }

        let mode = merge_modes(ancestor, ours, theirs).or(match self.options.favor {
            FileFavor::Ours => Some(ours.mode),
            FileFavor::Theirs => Some(theirs.mode),
            FileFavor::Normal | FileFavor::Union => None,
        });
        let Some(mode) = mode else {
            return Ok(conflict);
        };

        if ours.oid == theirs.oid {
            return Ok(Resolution::Clean(DatabaseEntry::new(ours.oid, mode), Side::Both));
        }

        let base = match ancestor {
            Some(ancestor) => self.blob(&ancestor.oid)?,
            None => Bytes::new(),
        };
        let merged = merge_file(
            &base,
            &self.blob(&ours.oid)?,
            &self.blob(&theirs.oid)?,
            self.options.favor,
        );
        if !merged.automergeable {
            return Ok(conflict);
        }

        let oid = self.database.write(&merged.content, ObjectType::Blob)?;
        Ok(Resolution::Clean(DatabaseEntry::new(oid, mode), Side::Both))
    }

    fn blob(&self, oid: &ObjectId) -> Result<Bytes> {
        Ok(self.database.parse_object_as_blob(oid)?.content().clone())
    }

    /// Stage resolutions into an index bound to the database
    ///
    /// A clean entry that is a parent directory or a child of another result
    /// path collides as file/directory and is staged on its side instead.
    fn build_index(&self, resolutions: BTreeMap<BString, Resolution>) -> Result<Index> {
        let paths: BTreeSet<&BStr> = resolutions.keys().map(|path| path.as_bstr()).collect();
        let collides = |path: &BStr| {
            let has_parent = path
                .find_iter("/")
                .any(|position| paths.contains(&path[..position].as_bstr()));
            let mut prefix = BString::from(path);
            prefix.push(b'/');
            let has_child = paths
                .range::<&BStr, _>(prefix.as_bstr()..)
                .next()
                .is_some_and(|next| next.starts_with(&prefix));
            has_parent || has_child
        };

        let mut entries = Vec::new();
        for (path, resolution) in &resolutions {
            let stage_entry = |entry: DatabaseEntry, stage: Stage| {
                IndexEntry::from_tree_entry(path.clone(), entry.oid, entry.mode).with_stage(stage)
            };

            match resolution {
                Resolution::Clean(entry, side) if collides(path.as_bstr()) => {
                    let stage = match side {
                        Side::Ours | Side::Both => Stage::Ours,
                        Side::Theirs => Stage::Theirs,
                    };
                    entries.push(stage_entry(*entry, stage));
                }
                Resolution::Clean(entry, _) => entries.push(stage_entry(*entry, Stage::Normal)),
                Resolution::Conflict {
                    ancestor,
                    ours,
                    theirs,
                } => {
                    let stages = [
                        (ancestor, Stage::Ancestor),
                        (ours, Stage::Ours),
                        (theirs, Stage::Theirs),
                    ];
                    for (entry, stage) in stages {
                        if let Some(entry) = entry {
                            entries.push(stage_entry(*entry, stage));
                        }
                    }
                }
            }
        }

        Ok(Index::from_entries(entries)?.with_database(Arc::clone(self.database)))
    }
}

/// Mode both sides agree on, or the one changed relative to the ancestor
fn merge_modes(
    ancestor: Option<DatabaseEntry>,
    ours: DatabaseEntry,
    theirs: DatabaseEntry,
) -> Option<EntryMode> {
    if ours.mode == theirs.mode {
        return Some(ours.mode);
    }

    match ancestor {
        Some(ancestor) if ancestor.mode == ours.mode => Some(theirs.mode),
        Some(ancestor) if ancestor.mode == theirs.mode => Some(ours.mode),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::objects::tree::{Tree, TreeBuilder};
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const REGULAR: EntryMode = EntryMode::File(FileMode::Regular);
    const EXECUTABLE: EntryMode = EntryMode::File(FileMode::Executable);

    #[fixture]
    fn database() -> Arc<Database> {
        Arc::new(Database::in_memory())
    }

    fn tree(database: &Database, files: &[(&str, &str, EntryMode)]) -> ObjectId {
        let mut builder = TreeBuilder::default();
        for (path, content, mode) in files {
            let oid = database.write(content.as_bytes(), ObjectType::Blob).unwrap();
            builder.insert(path, DatabaseEntry::new(oid, *mode)).unwrap();
        }
        builder.write(&mut |tree: &Tree| database.store(tree)).unwrap()
    }

    fn merge(
        database: &Arc<Database>,
        favor: FileFavor,
        ancestor: &[(&str, &str, EntryMode)],
        ours: &[(&str, &str, EntryMode)],
        theirs: &[(&str, &str, EntryMode)],
    ) -> Index {
        let (ancestor, ours, theirs) = (tree(database, ancestor), tree(database, ours), tree(database, theirs));
        TreeMerge::new(database, MergeOptions { favor })
            .merge(Some(&ancestor), &ours, &theirs)
            .unwrap()
    }

    fn staged(index: &Index) -> Vec<(String, Stage)> {
        index.entries().map(|entry| (entry.name.to_string(), entry.stage)).collect()
    }

    fn content(database: &Database, index: &Index, path: &str) -> String {
        let entry = index.get(path, Stage::Normal).unwrap();
        let blob = database.parse_object_as_blob(&entry.oid).unwrap();
        String::from_utf8(blob.content().to_vec()).unwrap()
    }

    #[rstest]
    fn conflicting_edits_are_staged_on_three_stages(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("file.txt", "X\n", REGULAR)],
            &[("file.txt", "Y\n", REGULAR)],
            &[("file.txt", "Z\n", REGULAR)],
        );

        assert!(index.has_conflicts());
        assert_eq!(
            staged(&index),
            vec![
                ("file.txt".to_string(), Stage::Ancestor),
                ("file.txt".to_string(), Stage::Ours),
                ("file.txt".to_string(), Stage::Theirs),
            ]
        );
        assert_eq!(index.create_tree().unwrap_err().kind(), ErrorKind::UnmergedEntries);
    }

    #[rstest]
    fn one_sided_change_is_taken(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("file.txt", "X\n", REGULAR)],
            &[("file.txt", "Y\n", REGULAR)],
            &[("file.txt", "X\n", REGULAR)],
        );

        assert!(!index.has_conflicts());
        assert_eq!(staged(&index), vec![("file.txt".to_string(), Stage::Normal)]);
        assert_eq!(content(&database, &index, "file.txt"), "Y\n");
    }

    #[rstest]
    fn separate_hunks_merge_into_a_new_blob(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("f", "1\n2\n3\n4\n5\n", REGULAR), ("same", "s", REGULAR)],
            &[("f", "one\n2\n3\n4\n5\n", REGULAR), ("same", "s", REGULAR)],
            &[("f", "1\n2\n3\n4\nfive\n", REGULAR), ("same", "s", REGULAR)],
        );

        assert_eq!(content(&database, &index, "f"), "one\n2\n3\n4\nfive\n");
        let expected = tree(
            &database,
            &[("f", "one\n2\n3\n4\nfive\n", REGULAR), ("same", "s", REGULAR)],
        );
        assert_eq!(index.create_tree().unwrap(), expected);
    }

    #[rstest]
    #[case(FileFavor::Ours, "Y\n")]
    #[case(FileFavor::Theirs, "Z\n")]
    #[case(FileFavor::Union, "Y\nZ\n")]
    fn favors_resolve_content_conflicts(database: Arc<Database>, #[case] favor: FileFavor, #[case] expected: &str) {
        let index = merge(
            &database,
            favor,
            &[("file.txt", "X\n", REGULAR)],
            &[("file.txt", "Y\n", REGULAR)],
            &[("file.txt", "Z\n", REGULAR)],
        );

        assert!(!index.has_conflicts());
        assert_eq!(content(&database, &index, "file.txt"), expected);
    }

    #[rstest]
    fn mode_change_on_one_side_merges_with_content_change(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("run.sh", "a\nb\n", REGULAR)],
            &[("run.sh", "a\nb\n", EXECUTABLE)],
            &[("run.sh", "a\nB\n", REGULAR)],
        );

        let entry = index.get("run.sh", Stage::Normal).unwrap();
        assert_eq!(entry.mode(), EXECUTABLE);
        assert_eq!(content(&database, &index, "run.sh"), "a\nB\n");
    }

    #[rstest]
    fn modify_delete_stages_only_the_present_sides(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("file.txt", "X\n", REGULAR)],
            &[],
            &[("file.txt", "Z\n", REGULAR)],
        );

        assert_eq!(
            staged(&index),
            vec![
                ("file.txt".to_string(), Stage::Ancestor),
                ("file.txt".to_string(), Stage::Theirs),
            ]
        );

        let favored = merge(
            &database,
            FileFavor::Ours,
            &[("file.txt", "X\n", REGULAR)],
            &[],
            &[("file.txt", "Z\n", REGULAR)],
        );
        assert!(favored.is_empty());
    }

    #[rstest]
    fn add_add_merges_against_an_empty_ancestor(database: Arc<Database>) {
        let clean = merge(
            &database,
            FileFavor::Normal,
            &[],
            &[("new", "same\n", REGULAR)],
            &[("new", "same\n", REGULAR)],
        );
        assert_eq!(staged(&clean), vec![("new".to_string(), Stage::Normal)]);

        let conflicted = merge(
            &database,
            FileFavor::Normal,
            &[],
            &[("new", "left\n", REGULAR)],
            &[("new", "right\n", REGULAR)],
        );
        assert_eq!(
            staged(&conflicted),
            vec![("new".to_string(), Stage::Ours), ("new".to_string(), Stage::Theirs)]
        );
    }

    #[rstest]
    fn directory_file_collisions_are_conflicts(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("keep", "k", REGULAR)],
            &[("keep", "k", REGULAR), ("path", "file", REGULAR)],
            &[("keep", "k", REGULAR), ("path/inner", "nested", REGULAR)],
        );

        assert_eq!(
            staged(&index),
            vec![
                ("keep".to_string(), Stage::Normal),
                ("path".to_string(), Stage::Ours),
                ("path/inner".to_string(), Stage::Theirs),
            ]
        );
    }

    #[rstest]
    fn symlink_conflicts_are_not_merged_line_wise(database: Arc<Database>) {
        let index = merge(
            &database,
            FileFavor::Normal,
            &[("link", "a", EntryMode::Symlink)],
            &[("link", "b", EntryMode::Symlink)],
            &[("link", "c", EntryMode::Symlink)],
        );
        assert_eq!(index.conflicts().len(), 1);
    }

    #[rstest]
    fn merging_without_an_ancestor_treats_everything_as_added(database: Arc<Database>) {
        let ours = tree(&database, &[("a", "1", REGULAR)]);
        let theirs = tree(&database, &[("b", "2", REGULAR)]);

        let index = TreeMerge::new(&database, MergeOptions::default())
            .merge(None, &ours, &theirs)
            .unwrap();

        assert_eq!(
            staged(&index),
            vec![("a".to_string(), Stage::Normal), ("b".to_string(), Stage::Normal)]
        );
    }
}
