//! Core storage engine of a Git-compatible version control library
//!
//! The crate is split into:
//!
//! - `areas`: stateful components bound to a repository on disk (object database,
//!   index, references, workspace, repository)
//! - `artifacts`: value types and algorithms operating on them (objects, backends,
//!   index entries, revision walking, tree diffing, merging)
//! - `commands`: the plumbing commands of the `bitcore` binary
//!
//! Errors are reported through [`errors::Error`], whose [`errors::ErrorKind`]
//! mirrors the taxonomy every operation documents.

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod config;
pub mod errors;

pub use areas::database::Database;
pub use areas::index::Index;
pub use areas::refs::Refs;
pub use areas::repository::Repository;
pub use errors::{Error, ErrorKind, Result};
