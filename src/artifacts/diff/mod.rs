//! Diff algorithms and tree comparison
//!
//! - `myers`: Myers' shortest edit script over arbitrary sequences
//! - `pathspec`: prefix matching used to restrict comparisons
//! - `tree_diff`: recursive tree-to-tree and tree-to-index comparison

pub mod myers;
pub mod pathspec;
pub mod tree_diff;
