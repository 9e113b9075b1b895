//! Merging
//!
//! - `bca_finder`: best common ancestors of two commits
//! - `file_merge`: line-based three-way merge of blob contents
//! - `tree_merge`: path-by-path three-way merge of trees into a staged index

pub mod bca_finder;
pub mod file_merge;
pub mod tree_merge;
