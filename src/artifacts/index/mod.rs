//! Git index file format
//!
//! The index (also called staging area or cache) stores information about the working tree.
//! It tracks which files should be included in the next commit, and during a merge it
//! holds up to three conflict stages per path.
//!
//! ## File Format
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2, 3 or 4 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - v2/v3: each entry padded with NULs to 8-byte alignment
//!   - v3: entries with the extended bit carry 2 more flag bytes
//!   - v4: paths are prefix-compressed against the previous entry, no padding
//!
//! Extensions (optional):
//!   - 4-byte signature, 4-byte size, payload
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of SHA-1 checksum in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12; // 4 bytes for marker, 4 for version, 4 for entries_count

/// Magic signature identifying index files
pub const SIGNATURE: &[u8; 4] = b"DIRC";

/// Versions this crate can read
pub const SUPPORTED_VERSIONS: [u32; 3] = [2, 3, 4];
