//! Object storage building blocks
//!
//! - `backend`: the storage capability every medium implements
//! - `loose`, `pack`, `memory`: concrete backends
//! - `raw_object`: type-tagged payloads exchanged with backends
//! - `database_entry`: `(oid, mode)` pairs as found in trees

pub mod backend;
pub mod database_entry;
pub mod delta;
pub mod loose;
pub mod memory;
pub mod pack;
pub mod pack_index;
pub mod raw_object;
