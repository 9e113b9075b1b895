//! Commit history traversal
//!
//! - `rev_walk`: push/hide set algebra over the commit graph with time,
//!   topological and reverse orderings
//!
//! ## Algorithm
//!
//! Hidden commits are closed over their ancestry first. The visible commits
//! are then discovered through a frontier ordered by committer time, the same
//! way `git rev-list` does without ordering flags. Topological and date
//! orderings are applied to that discovery list afterwards.

pub mod rev_walk;
