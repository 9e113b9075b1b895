//! Pack index (`.idx`) parsing
//!
//! ## Version 1
//!
//! ```text
//! fanout[256]          u32, cumulative object counts by first id byte
//! entries[n]           u32 offset + 20-byte id
//! pack checksum        20 bytes
//! idx checksum         20 bytes
//! ```
//!
//! ## Version 2
//!
//! ```text
//! magic "\377tOc", version 2
//! fanout[256]
//! ids[n]               20 bytes each, sorted
//! crc32[n]
//! offsets[n]           u32; MSB set means index into the 64-bit table
//! large offsets[m]     u64
//! pack checksum, idx checksum
//! ```

use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::errors::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use sha1::{Digest, Sha1};
use std::path::Path;

const V2_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const FANOUT_SIZE: usize = 256 * 4;
const TRAILER_SIZE: usize = 2 * OBJECT_ID_RAW_LENGTH;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Clone)]
pub struct PackIndex {
    ids: Vec<ObjectId>,
    offsets: Vec<u64>,
    pack_checksum: [u8; OBJECT_ID_RAW_LENGTH],
}

impl PackIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(&data).map_err(|error| match error {
            Error::CorruptObject { reason, .. } => {
                Error::corrupt_object(path.display(), format!("invalid pack index: {reason}"))
            }
            other => other,
        })
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TRAILER_SIZE {
            return Err(Error::malformed("pack index is truncated"));
        }

        let (body, checksum) = data.split_at(data.len() - OBJECT_ID_RAW_LENGTH);
        if Sha1::digest(body).as_slice() != checksum {
            return Err(Error::malformed("pack index checksum mismatch"));
        }

        if data.starts_with(&V2_MAGIC) {
            let version = BigEndian::read_u32(&data[4..8]);
            if version != 2 {
                return Err(Error::malformed(format!("unsupported pack index version {version}")));
            }
            Self::parse_v2(data)
        } else {
            Self::parse_v1(data)
        }
    }

    fn read_fanout(data: &[u8]) -> Result<usize> {
        if data.len() < FANOUT_SIZE {
            return Err(Error::malformed("pack index fanout is truncated"));
        }

        let mut previous = 0;
        for bucket in data[..FANOUT_SIZE].chunks_exact(4) {
            let count = BigEndian::read_u32(bucket);
            if count < previous {
                return Err(Error::malformed("pack index fanout is not monotonic"));
            }
            previous = count;
        }

        Ok(previous as usize)
    }

    fn parse_v1(data: &[u8]) -> Result<Self> {
        let count = Self::read_fanout(data)?;
        let entry_size = 4 + OBJECT_ID_RAW_LENGTH;
        let entries_end = FANOUT_SIZE + count * entry_size;
        if data.len() != entries_end + TRAILER_SIZE {
            return Err(Error::malformed("pack index v1 has an unexpected size"));
        }

        let mut ids = Vec::with_capacity(count);
        let mut offsets = Vec::with_capacity(count);
        for entry in data[FANOUT_SIZE..entries_end].chunks_exact(entry_size) {
            offsets.push(BigEndian::read_u32(&entry[..4]) as u64);
            ids.push(Self::read_id(&entry[4..])?);
        }

        Self::build(ids, offsets, &data[entries_end..])
    }

    fn parse_v2(data: &[u8]) -> Result<Self> {
        let fanout_start = 8;
        let count = Self::read_fanout(&data[fanout_start..])?;

        let ids_start = fanout_start + FANOUT_SIZE;
        let crc_start = ids_start + count * OBJECT_ID_RAW_LENGTH;
        let offsets_start = crc_start + count * 4;
        let large_start = offsets_start + count * 4;
        if data.len() < large_start + TRAILER_SIZE {
            return Err(Error::malformed("pack index v2 is truncated"));
        }

        let large_offsets = &data[large_start..data.len() - TRAILER_SIZE];
        if large_offsets.len() % 8 != 0 {
            return Err(Error::malformed("pack index v2 large offset table is misaligned"));
        }

        let ids = data[ids_start..crc_start]
            .chunks_exact(OBJECT_ID_RAW_LENGTH)
            .map(Self::read_id)
            .collect::<Result<Vec<_>>>()?;

        let mut offsets = Vec::with_capacity(count);
        for raw in data[offsets_start..large_start].chunks_exact(4) {
            let offset = BigEndian::read_u32(raw);
            if offset & LARGE_OFFSET_FLAG == 0 {
                offsets.push(offset as u64);
                continue;
            }

            let slot = (offset & !LARGE_OFFSET_FLAG) as usize * 8;
            let large = large_offsets
                .get(slot..slot + 8)
                .ok_or_else(|| Error::malformed("pack index large offset out of range"))?;
            offsets.push(BigEndian::read_u64(large));
        }

        Self::build(ids, offsets, &data[data.len() - TRAILER_SIZE..])
    }

    fn read_id(raw: &[u8]) -> Result<ObjectId> {
        ObjectId::from_bytes(raw).map_err(|_| Error::malformed("pack index lists a null object id"))
    }

    fn build(ids: Vec<ObjectId>, offsets: Vec<u64>, trailer: &[u8]) -> Result<Self> {
        if ids.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::malformed("pack index ids are not strictly sorted"));
        }

        let mut pack_checksum = [0u8; OBJECT_ID_RAW_LENGTH];
        pack_checksum.copy_from_slice(&trailer[..OBJECT_ID_RAW_LENGTH]);

        Ok(PackIndex {
            ids,
            offsets,
            pack_checksum,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Checksum of the pack this index describes
    pub fn pack_checksum(&self) -> &[u8; OBJECT_ID_RAW_LENGTH] {
        &self.pack_checksum
    }

    /// Offset of `oid` inside the pack
    pub fn find(&self, oid: &ObjectId) -> Option<u64> {
        self.ids
            .binary_search(oid)
            .ok()
            .map(|position| self.offsets[position])
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.ids.binary_search(oid).is_ok()
    }

    pub fn find_by_prefix(&self, prefix: &ShortObjectId) -> Vec<ObjectId> {
        // hex order equals byte order, so matches form one contiguous run
        let start = self
            .ids
            .partition_point(|oid| oid.to_string().as_str() < prefix.as_ref());

        self.ids[start..]
            .iter()
            .take_while(|oid| prefix.matches(oid))
            .copied()
            .collect()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use byteorder::WriteBytesExt;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn oid(first: u8, last: u8) -> ObjectId {
        let mut bytes = [0x11u8; OBJECT_ID_RAW_LENGTH];
        bytes[0] = first;
        bytes[OBJECT_ID_RAW_LENGTH - 1] = last;
        ObjectId::from_bytes(&bytes).unwrap()
    }

    fn fanout(ids: &[ObjectId]) -> Vec<u8> {
        let mut data = Vec::new();
        for byte in 0..=255u8 {
            let count = ids.iter().filter(|oid| oid.as_bytes()[0] <= byte).count();
            data.write_u32::<BigEndian>(count as u32).unwrap();
        }
        data
    }

    fn seal(mut data: Vec<u8>) -> Vec<u8> {
        data.write_all(&[0xaa; OBJECT_ID_RAW_LENGTH]).unwrap();
        let checksum = Sha1::digest(&data);
        data.write_all(&checksum).unwrap();
        data
    }

    fn v2(entries: &[(ObjectId, u64)]) -> Vec<u8> {
        let ids: Vec<_> = entries.iter().map(|(oid, _)| *oid).collect();
        let mut data = V2_MAGIC.to_vec();
        data.write_u32::<BigEndian>(2).unwrap();
        data.extend(fanout(&ids));
        for oid in &ids {
            data.write_all(oid.as_bytes()).unwrap();
        }
        for _ in &ids {
            data.write_u32::<BigEndian>(0).unwrap();
        }

        let mut large = Vec::new();
        for (_, offset) in entries {
            if *offset > 0x7fff_ffff {
                data.write_u32::<BigEndian>(LARGE_OFFSET_FLAG | (large.len() / 8) as u32)
                    .unwrap();
                large.write_u64::<BigEndian>(*offset).unwrap();
            } else {
                data.write_u32::<BigEndian>(*offset as u32).unwrap();
            }
        }
        data.extend(large);

        seal(data)
    }

    #[test]
    fn reads_v1_entries() {
        let ids = [oid(0x01, 1), oid(0x80, 2)];
        let mut data = fanout(&ids);
        for (oid, offset) in ids.iter().zip([12u32, 345]) {
            data.write_u32::<BigEndian>(offset).unwrap();
            data.write_all(oid.as_bytes()).unwrap();
        }

        let index = PackIndex::parse(&seal(data)).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.find(&ids[0]), Some(12));
        assert_eq!(index.find(&ids[1]), Some(345));
        assert_eq!(index.find(&oid(0x80, 3)), None);
        assert_eq!(index.pack_checksum(), &[0xaa; OBJECT_ID_RAW_LENGTH]);
    }

    #[test]
    fn reads_v2_with_large_offsets() {
        let entries = [(oid(0x01, 1), 12), (oid(0x02, 1), 5_000_000_000), (oid(0xfe, 9), 99)];

        let index = PackIndex::parse(&v2(&entries)).unwrap();

        for (oid, offset) in entries {
            assert_eq!(index.find(&oid), Some(offset));
        }
    }

    #[test]
    fn prefix_lookup_returns_contiguous_matches() {
        let entries = [(oid(0xab, 1), 12), (oid(0xab, 2), 40), (oid(0xac, 1), 80)];
        let index = PackIndex::parse(&v2(&entries)).unwrap();

        let found = index.find_by_prefix(&ShortObjectId::try_parse("ab11").unwrap());

        assert_eq!(found, vec![entries[0].0, entries[1].0]);
    }

    #[test]
    fn checksum_mismatch_is_corrupt() {
        let mut data = v2(&[(oid(0x01, 1), 12)]);
        let last = data.len() - 1;
        data[last] ^= 0xff;

        let error = PackIndex::parse(&data).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CorruptObject);
    }
}
