//! Index entry representation
//!
//! Each entry in the index represents a tracked path with:
//! - Path, relative to the repository root and slash-separated
//! - Content hash (object ID)
//! - File metadata (mode, size, timestamps)
//! - Conflict stage
//!
//! ## Entry Format
//!
//! ```text
//! ctime, ctime_nsec, mtime, mtime_nsec, dev, ino, mode, uid, gid, size   u32 each
//! oid                                                                  20 bytes
//! flags: assume-valid(1) | extended(1) | stage(2) | name length(12)   u16
//! extended flags (v3+, only when the extended bit is set)               u16
//! path, NUL-padded to a multiple of 8 bytes (v2/v3)
//! ```
//!
//! Metadata includes both file status (mode, size) and timestamps (mtime, ctime)
//! which enable fast change detection without reading file content.

use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bstr::{BStr, BString, ByteSlice};
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use is_executable::IsExecutable;
use std::fs::Metadata;
use std::io::{Read, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::Path;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Size of the fixed part of an entry, up to and including the flags
pub const ENTRY_FIXED_SIZE: usize = 62;

const FLAG_ASSUME_VALID: u16 = 0x8000;
const FLAG_EXTENDED: u16 = 0x4000;
const FLAG_STAGE_MASK: u16 = 0x3000;
const FLAG_STAGE_SHIFT: u16 = 12;
const FLAG_NAME_MASK: u16 = 0x0fff;

pub const EXTENDED_INTENT_TO_ADD: u16 = 0x2000;
pub const EXTENDED_SKIP_WORKTREE: u16 = 0x4000;

/// Conflict stage of an entry; 0 is resolved, 1-3 are the sides of a conflict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    #[default]
    Normal,
    Ancestor,
    Ours,
    Theirs,
}

impl Stage {
    pub fn as_u16(&self) -> u16 {
        match self {
            Stage::Normal => 0,
            Stage::Ancestor => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Stage::Normal),
            1 => Some(Stage::Ancestor),
            2 => Some(Stage::Ours),
            3 => Some(Stage::Theirs),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Normal
    }
}

/// Index entry representing a tracked path at one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to repository root, slash-separated, in raw bytes
    pub name: BString,
    /// Hash of the blob (or gitlink commit)
    pub oid: ObjectId,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
    pub stage: Stage,
    pub assume_valid: bool,
    /// Extended flags (intent-to-add, skip-worktree); forces a v3 index when set
    pub extended_flags: u16,
}

impl IndexEntry {
    pub fn new(name: impl Into<BString>, oid: ObjectId, metadata: EntryMetadata) -> Self {
        IndexEntry {
            name: name.into(),
            oid,
            metadata,
            stage: Stage::Normal,
            assume_valid: false,
            extended_flags: 0,
        }
    }

    /// Entry carrying only a mode, as produced from a tree
    pub fn from_tree_entry(name: impl Into<BString>, oid: ObjectId, mode: EntryMode) -> Self {
        Self::new(
            name,
            oid,
            EntryMetadata {
                mode,
                ..Default::default()
            },
        )
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn mode(&self) -> EntryMode {
        self.metadata.mode
    }

    pub fn basename(&self) -> &BStr {
        match self.name.rfind_byte(b'/') {
            Some(position) => self.name[position + 1..].as_bstr(),
            None => self.name.as_bstr(),
        }
    }

    /// Ancestor directories, outermost first: `a/b/c` gives `["a", "a/b"]`
    pub fn parent_dirs(&self) -> Vec<&BStr> {
        self.name
            .find_iter("/")
            .map(|position| self.name[..position].as_bstr())
            .collect()
    }

    pub fn has_extended_flags(&self) -> bool {
        self.extended_flags != 0
    }

    fn flags(&self) -> u16 {
        let mut flags = (self.stage.as_u16() << FLAG_STAGE_SHIFT) & FLAG_STAGE_MASK;
        flags |= self.name.len().min(FLAG_NAME_MASK as usize) as u16;
        if self.assume_valid {
            flags |= FLAG_ASSUME_VALID;
        }
        if self.has_extended_flags() {
            flags |= FLAG_EXTENDED;
        }
        flags
    }

    /// Encode for a v2 or v3 index
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let metadata = &self.metadata;

        let mut entry_bytes = Vec::with_capacity(ENTRY_FIXED_SIZE + self.name.len() + 8);
        entry_bytes.write_u32::<NetworkEndian>(metadata.ctime as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.mtime as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.dev as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.ino as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.mode.as_u32())?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.uid)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.gid)?;
        entry_bytes.write_u32::<NetworkEndian>(metadata.size as u32)?;
        self.oid.write_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<NetworkEndian>(self.flags())?;
        if self.has_extended_flags() {
            entry_bytes.write_u16::<NetworkEndian>(self.extended_flags)?;
        }
        entry_bytes.write_all(&self.name)?;

        // There must be at least one NUL at the end, then pad to ENTRY_BLOCK
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(entry_bytes)
    }

    /// Decode one entry; `previous_name` feeds v4 path prefix compression
    pub fn deserialize<R: Read>(
        reader: &mut Checksum<R>,
        version: u32,
        previous_name: &[u8],
    ) -> Result<Self> {
        let bytes = reader.read(ENTRY_FIXED_SIZE)?;
        let field = |index: usize| NetworkEndian::read_u32(&bytes[index * 4..index * 4 + 4]);

        let mode = EntryMode::try_from(field(6))
            .map_err(|_| Error::corrupt_index(format!("invalid entry mode {:o}", field(6))))?;
        let oid = ObjectId::from_bytes(&bytes[40..60])
            .map_err(|_| Error::corrupt_index("entry has a null object id"))?;
        let flags = NetworkEndian::read_u16(&bytes[60..62]);

        let mut consumed = ENTRY_FIXED_SIZE;
        let extended_flags = if flags & FLAG_EXTENDED != 0 {
            if version < 3 {
                return Err(Error::corrupt_index("extended flags in a version 2 index"));
            }
            consumed += 2;
            NetworkEndian::read_u16(&reader.read(2)?)
        } else {
            0
        };

        let name_bytes = if version >= 4 {
            let strip = read_offset_varint(reader)?;
            let kept = previous_name.len().checked_sub(strip).ok_or_else(|| {
                Error::corrupt_index("path prefix is longer than the previous path")
            })?;
            let mut name = previous_name[..kept].to_vec();
            name.extend(reader.read_until_nul()?);
            name
        } else {
            let length = (flags & FLAG_NAME_MASK) as usize;
            let (name, nul_consumed) = if length < FLAG_NAME_MASK as usize {
                (reader.read(length)?.to_vec(), 0)
            } else {
                (reader.read_until_nul()?, 1)
            };

            let padded = (consumed + name.len() + ENTRY_BLOCK) & !(ENTRY_BLOCK - 1);
            let padding = reader.read(padded - consumed - name.len() - nul_consumed)?;
            if padding.iter().any(|&byte| byte != 0) {
                return Err(Error::corrupt_index("entry padding is not NUL"));
            }
            name
        };

        let name = BString::from(name_bytes);
        let stage = Stage::from_u16((flags & FLAG_STAGE_MASK) >> FLAG_STAGE_SHIFT)
            .unwrap_or_default();

        Ok(IndexEntry {
            name,
            oid,
            metadata: EntryMetadata {
                ctime: field(0) as i64,
                ctime_nsec: field(1) as i64,
                mtime: field(2) as i64,
                mtime_nsec: field(3) as i64,
                dev: field(4) as u64,
                ino: field(5) as u64,
                mode,
                uid: field(7),
                gid: field(8),
                size: field(9) as u64,
            },
            stage,
            assume_valid: flags & FLAG_ASSUME_VALID != 0,
            extended_flags,
        })
    }
}

/// Offset varint used by v4 path compression (same scheme as pack OFS_DELTA)
fn read_offset_varint<R: Read>(reader: &mut Checksum<R>) -> Result<usize> {
    let mut byte = reader.read(1)?[0];
    let mut value = (byte & 0x7f) as usize;
    while byte & 0x80 != 0 {
        byte = reader.read(1)?[0];
        value = value
            .checked_add(1)
            .and_then(|value| value.checked_mul(128))
            .ok_or_else(|| Error::corrupt_index("path prefix length overflows"))?
            | (byte & 0x7f) as usize;
    }

    Ok(value)
}

/// File metadata stored in index entries
///
/// Contains both file status information (mode, size, inode) and timestamps.
/// This metadata enables Git to quickly detect file changes without reading
/// content by comparing stat information.
///
/// ## Timestamps
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
///
/// Both include nanosecond precision for accurate change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Change time (seconds since Unix epoch)
    pub ctime: i64,
    /// Change time nanoseconds
    pub ctime_nsec: i64,
    /// Modification time (seconds since Unix epoch)
    pub mtime: i64,
    /// Modification time nanoseconds
    pub mtime_nsec: i64,
    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// File mode (permissions and type)
    pub mode: EntryMode,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// File size in bytes
    pub size: u64,
}

impl EntryMetadata {
    /// Stat data of a working-tree path; `metadata` must come from `symlink_metadata`
    pub fn from_stat(file_path: &Path, metadata: &Metadata) -> Self {
        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if metadata.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        }
    }
}
