//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 20-byte SHA-1 digests, rendered as 40 hexadecimal characters.
//! They uniquely identify all objects in Git (blobs, trees, commits, tags).
//!
//! ## Format
//!
//! - Full: 40 hex characters (e.g., "abc123...def")
//! - Short: a hex prefix of at least 4 characters, used for lookups
//!
//! ## Storage
//!
//! Loose objects live in `objects/<first-2-chars>/<remaining-38-chars>`

use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::{MIN_SHORT_OID_LENGTH, OBJECT_ID_LENGTH, OBJECT_ID_RAW_LENGTH};
use crate::errors::{Error, Result};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Git object identifier (SHA-1 hash)
///
/// Holds the raw digest; hex is only produced on display. The all-zero value is
/// reserved by Git as "no object" and is never a valid identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_RAW_LENGTH]);

impl ObjectId {
    /// Parse and validate an object ID from its 40-character hex form
    pub fn try_parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();
        if id.len() != OBJECT_ID_LENGTH {
            return Err(Error::invalid_argument(format!(
                "invalid object id length {}: {id:?}",
                id.len()
            )));
        }

        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        hex::decode_to_slice(id, &mut raw)
            .map_err(|_| Error::invalid_argument(format!("invalid object id characters: {id:?}")))?;

        Self::from_bytes(&raw)
    }

    /// Build an object ID from its 20 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; OBJECT_ID_RAW_LENGTH] = bytes.try_into().map_err(|_| {
            Error::invalid_argument(format!("invalid raw object id length {}", bytes.len()))
        })?;

        if raw.iter().all(|&byte| byte == 0) {
            return Err(Error::invalid_argument("the null object id is not valid"));
        }

        Ok(Self(raw))
    }

    /// Compute the identifier of an object from its type and payload
    ///
    /// The digest covers the loose header `"<type> <size>\0"` followed by the payload.
    pub fn hash(object_type: ObjectType, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type, data.len()).as_bytes());
        hasher.update(data);

        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.0
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree entries and index entries.
    pub fn write_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_from<R: io::Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;

        Self::from_bytes(&raw)
    }

    /// Convert to file system path for loose object storage
    ///
    /// Splits the hash as `XX/YYYYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_string();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        self.to_string()[..7].to_string()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s)
    }
}

/// Abbreviated object identifier, as typed by users
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShortObjectId(String);

impl ShortObjectId {
    pub fn try_parse(prefix: impl AsRef<str>) -> Result<Self> {
        let prefix = prefix.as_ref().to_ascii_lowercase();

        if prefix.len() < MIN_SHORT_OID_LENGTH || prefix.len() > OBJECT_ID_LENGTH {
            return Err(Error::invalid_argument(format!(
                "short object id must have between {MIN_SHORT_OID_LENGTH} and {OBJECT_ID_LENGTH} hex digits, got {prefix:?}"
            )));
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_argument(format!(
                "invalid short object id characters: {prefix:?}"
            )));
        }

        Ok(Self(prefix))
    }

    pub fn matches(&self, oid: &ObjectId) -> bool {
        oid.to_string().starts_with(&self.0)
    }

    pub fn is_full(&self) -> bool {
        self.0.len() == OBJECT_ID_LENGTH
    }
}

impl AsRef<str> for ShortObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
