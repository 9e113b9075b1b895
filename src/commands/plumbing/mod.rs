//! Plumbing commands (low-level Git operations)
//!
//! ## Commands
//!
//! - objects: `hash-object`, `cat-file`
//! - index: `update-index`, `ls-files`, `write-tree`, `read-tree`
//! - references: `update-ref`, `symbolic-ref`, `show-ref`
//! - history: `commit-tree`, `rev-list`, `merge-base`
//! - comparison: `diff-tree`, `merge-tree`

pub mod cat_file;
pub mod commit_tree;
pub mod diff_tree;
pub mod hash_object;
pub mod init;
pub mod ls_files;
pub mod merge_base;
pub mod merge_tree;
pub mod read_tree;
pub mod rev_list;
pub mod show_ref;
pub mod symbolic_ref;
pub mod update_index;
pub mod update_ref;
pub mod write_tree;
