//! Type-tagged object payload, the unit backends store and return
//!
//! ## Loose format
//!
//! `<type> <size>\0<payload>`, zlib-compressed on disk

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;

/// Type and size of an object, readable without decoding the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub size: usize,
}

impl ObjectHeader {
    /// Parse `"<type> <size>"` (without the trailing NUL)
    pub fn parse(header: &[u8]) -> Result<Self> {
        let header = std::str::from_utf8(header)
            .map_err(|_| Error::malformed("object header is not ASCII"))?;
        let (object_type, size) = header
            .split_once(' ')
            .ok_or_else(|| Error::malformed(format!("invalid object header {header:?}")))?;

        let object_type = ObjectType::try_from(object_type)
            .map_err(|_| Error::malformed(format!("unknown object type {object_type:?}")))?;
        let size = size
            .parse::<usize>()
            .map_err(|_| Error::malformed(format!("invalid object size {size:?}")))?;

        Ok(Self::new(object_type, size))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RawObject {
    pub object_type: ObjectType,
    pub data: Bytes,
}

impl RawObject {
    pub fn oid(&self) -> ObjectId {
        ObjectId::hash(self.object_type, &self.data)
    }

    pub fn header(&self) -> ObjectHeader {
        ObjectHeader::new(self.object_type, self.data.len())
    }

    /// Parse an inflated loose object, checking the declared size
    pub fn from_loose_format(content: &[u8]) -> Result<Self> {
        let null_pos = content
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::malformed("no NUL terminator in object header"))?;

        let header = ObjectHeader::parse(&content[..null_pos])?;
        let data = &content[null_pos + 1..];
        if data.len() != header.size {
            return Err(Error::malformed(format!(
                "object declares {} bytes but holds {}",
                header.size,
                data.len()
            )));
        }

        Ok(Self::new(header.object_type, Bytes::copy_from_slice(data)))
    }

    pub fn to_loose_format(&self) -> Vec<u8> {
        let mut result = format!("{} {}\0", self.object_type, self.data.len()).into_bytes();
        result.extend_from_slice(&self.data);
        result
    }
}
