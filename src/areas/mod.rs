//! Core repository components
//!
//! This module contains the stateful building blocks of a Git repository:
//!
//! - `database`: Object database routing reads and writes across storage backends
//! - `index`: Staging area (index/cache) including merge conflict stages
//! - `refs`: Reference management (branches, HEAD, tags, reflogs)
//! - `repository`: Repository discovery and the high-level operations built on the rest
//! - `workspace`: Working directory file system access

pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
