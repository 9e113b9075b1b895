//! Git data structures and algorithms
//!
//! - `core`: shared utilities (lock files)
//! - `database`: storage backends, raw objects and pack decoding
//! - `diff`: Myers line diff, pathspecs and tree-to-tree deltas
//! - `index`: index entries, modes and the on-disk format pieces
//! - `log`: commit history traversal
//! - `merge`: merge bases, file merges and tree merges
//! - `objects`: Git object types (blob, tree, commit, tag) and ids
//! - `refs`: reference names, packed refs, reflogs and revision syntax

pub mod core;
pub mod database;
pub mod diff;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod refs;
