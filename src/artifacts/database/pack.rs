//! Read-only access to packfiles under `objects/pack`
//!
//! ## Pack format
//!
//! ```text
//! "PACK" | version (2 or 3) | object count
//! entries: type+size varint header, optional delta base, zlib payload
//! trailer: SHA-1 of everything above
//! ```
//!
//! Entry headers pack the type in bits 4-6 of the first byte and the size in
//! the low 4 bits, continued 7 bits at a time while the MSB is set.

use crate::artifacts::database::backend::Backend;
use crate::artifacts::database::delta;
use crate::artifacts::database::pack_index::PackIndex;
use crate::artifacts::database::raw_object::{ObjectHeader, RawObject};
use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Longest delta chain followed before giving up
pub const MAX_DELTA_DEPTH: usize = 50;

const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const PACK_HEADER_SIZE: usize = 12;
/// Enough for a 64-bit size varint plus a 20-byte base id
const MAX_ENTRY_HEADER_SIZE: usize = 32;

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Base(ObjectType),
    OfsDelta(u64),
    RefDelta(ObjectId),
}

#[derive(Debug, Clone, Copy)]
struct EntryHeader {
    kind: EntryKind,
    size: usize,
    data_offset: u64,
}

/// `Read` over a file region through positional reads, so concurrent readers
/// never share a cursor
struct PackReader<'f> {
    file: &'f File,
    position: u64,
}

impl Read for PackReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.file.read_at(buf, self.position)?;
        self.position += read as u64;
        Ok(read)
    }
}

#[derive(Debug)]
struct Pack {
    path: PathBuf,
    file: File,
    len: u64,
    index: PackIndex,
}

impl Pack {
    fn open(index_path: &Path) -> Result<Self> {
        let path = index_path.with_extension("pack");
        let index = PackIndex::open(index_path)?;
        let file = File::open(&path)?;
        let len = file.metadata()?.len();

        let mut header = [0u8; PACK_HEADER_SIZE];
        file.read_exact_at(&mut header, 0)?;
        if &header[..4] != PACK_SIGNATURE {
            return Err(Error::corrupt_object(path.display(), "missing PACK signature"));
        }

        let version = BigEndian::read_u32(&header[4..8]);
        if version != 2 && version != 3 {
            return Err(Error::corrupt_object(
                path.display(),
                format!("unsupported pack version {version}"),
            ));
        }

        let count = BigEndian::read_u32(&header[8..12]) as usize;
        if count != index.len() {
            return Err(Error::corrupt_object(
                path.display(),
                format!("pack holds {count} objects but its index lists {}", index.len()),
            ));
        }

        Ok(Pack {
            path,
            file,
            len,
            index,
        })
    }

    fn read_entry_header(&self, offset: u64) -> Result<EntryHeader> {
        let mut buffer = [0u8; MAX_ENTRY_HEADER_SIZE];
        let available = self.file.read_at(&mut buffer, offset)?;
        let buffer = &buffer[..available];
        let truncated = || self.corrupt(offset, "truncated entry header");

        let mut pos = 0;
        let mut byte = *buffer.get(pos).ok_or_else(truncated)?;
        pos += 1;

        let type_code = (byte >> 4) & 0x07;
        let mut size = (byte & 0x0f) as usize;
        let mut shift = 4;
        while byte & 0x80 != 0 {
            byte = *buffer.get(pos).ok_or_else(truncated)?;
            pos += 1;
            if shift > 57 {
                return Err(self.corrupt(offset, "entry size overflows"));
            }
            size |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
        }

        let kind = match type_code {
            OFS_DELTA => {
                byte = *buffer.get(pos).ok_or_else(truncated)?;
                pos += 1;
                let mut distance = (byte & 0x7f) as u64;
                while byte & 0x80 != 0 {
                    byte = *buffer.get(pos).ok_or_else(truncated)?;
                    pos += 1;
                    distance = ((distance + 1) << 7) | (byte & 0x7f) as u64;
                }

                let base = offset
                    .checked_sub(distance)
                    .filter(|_| distance > 0)
                    .ok_or_else(|| self.corrupt(offset, "delta base offset out of range"))?;
                EntryKind::OfsDelta(base)
            }
            REF_DELTA => {
                let raw = buffer
                    .get(pos..pos + OBJECT_ID_RAW_LENGTH)
                    .ok_or_else(truncated)?;
                pos += OBJECT_ID_RAW_LENGTH;
                EntryKind::RefDelta(
                    ObjectId::from_bytes(raw)
                        .map_err(|_| self.corrupt(offset, "null delta base id"))?,
                )
            }
            code => EntryKind::Base(
                ObjectType::from_pack_code(code)
                    .ok_or_else(|| self.corrupt(offset, format!("unknown entry type {code}")))?,
            ),
        };

        Ok(EntryHeader {
            kind,
            size,
            data_offset: offset + pos as u64,
        })
    }

    /// Inflate up to `limit` bytes of an entry's zlib stream
    fn inflate(&self, header: &EntryHeader, limit: usize) -> Result<Vec<u8>> {
        let reader = PackReader {
            file: &self.file,
            position: header.data_offset,
        };
        let mut decoder = flate2::read::ZlibDecoder::new(reader).take(limit as u64);
        // declared sizes are untrusted
        let stored = self.len.saturating_sub(header.data_offset) as usize;
        let mut data = Vec::with_capacity(limit.min(header.size).min(stored));
        decoder.read_to_end(&mut data).map_err(|error| {
            self.corrupt(header.data_offset, format!("unable to inflate: {error}"))
        })?;

        Ok(data)
    }

    fn inflate_entry(&self, header: &EntryHeader) -> Result<Vec<u8>> {
        let data = self.inflate(header, header.size)?;
        if data.len() != header.size {
            return Err(self.corrupt(
                header.data_offset,
                format!("entry inflates to {} bytes, expected {}", data.len(), header.size),
            ));
        }

        Ok(data)
    }

    fn corrupt(&self, offset: u64, reason: impl std::fmt::Display) -> Error {
        Error::corrupt_object(
            format!("{}@{offset}", self.path.display()),
            reason.to_string(),
        )
    }
}

/// Packfile backend
///
/// Packs are scanned on construction and on [`Backend::refresh`]. Each pack keeps
/// its whole index in memory; payloads are read on demand.
#[derive(Debug)]
pub struct PackBackend {
    pack_dir: PathBuf,
    packs: RwLock<Vec<Arc<Pack>>>,
}

impl PackBackend {
    pub fn new(objects_path: impl AsRef<Path>) -> Result<Self> {
        let backend = PackBackend {
            pack_dir: objects_path.as_ref().join("pack"),
            packs: RwLock::new(Vec::new()),
        };
        backend.refresh()?;

        Ok(backend)
    }

    pub fn pack_count(&self) -> usize {
        self.packs().len()
    }

    fn packs(&self) -> Vec<Arc<Pack>> {
        self.packs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn locate(&self, oid: &ObjectId) -> Option<(Arc<Pack>, u64)> {
        self.packs()
            .into_iter()
            .find_map(|pack| pack.index.find(oid).map(|offset| (pack, offset)))
    }

    fn resolve(&self, pack: &Pack, offset: u64, depth: usize) -> Result<(ObjectType, Vec<u8>)> {
        if depth > MAX_DELTA_DEPTH {
            return Err(pack.corrupt(offset, "delta chain is too deep"));
        }

        let header = pack.read_entry_header(offset)?;
        match header.kind {
            EntryKind::Base(object_type) => Ok((object_type, pack.inflate_entry(&header)?)),
            EntryKind::OfsDelta(base_offset) => {
                let (object_type, base) = self.resolve(pack, base_offset, depth + 1)?;
                let patch = pack.inflate_entry(&header)?;
                let data = delta::apply(&base, &patch)
                    .map_err(|error| pack.corrupt(offset, error))?;
                Ok((object_type, data))
            }
            EntryKind::RefDelta(base_oid) => {
                let (object_type, base) = self.resolve_ref_base(pack, &base_oid, depth)?;
                let patch = pack.inflate_entry(&header)?;
                let data = delta::apply(&base, &patch)
                    .map_err(|error| pack.corrupt(offset, error))?;
                Ok((object_type, data))
            }
        }
    }

    fn resolve_ref_base(
        &self,
        pack: &Pack,
        base_oid: &ObjectId,
        depth: usize,
    ) -> Result<(ObjectType, Vec<u8>)> {
        if let Some(base_offset) = pack.index.find(base_oid) {
            return self.resolve(pack, base_offset, depth + 1);
        }

        let (base_pack, base_offset) = self
            .locate(base_oid)
            .ok_or_else(|| Error::corrupt_object(base_oid, "delta base missing from packs"))?;
        self.resolve(&base_pack, base_offset, depth + 1)
    }

    fn resolve_header(&self, pack: &Pack, offset: u64, depth: usize) -> Result<ObjectHeader> {
        if depth > MAX_DELTA_DEPTH {
            return Err(pack.corrupt(offset, "delta chain is too deep"));
        }

        let header = pack.read_entry_header(offset)?;
        let base_type = match header.kind {
            EntryKind::Base(object_type) => {
                return Ok(ObjectHeader::new(object_type, header.size));
            }
            EntryKind::OfsDelta(base_offset) => {
                self.resolve_header(pack, base_offset, depth + 1)?.object_type
            }
            EntryKind::RefDelta(base_oid) => {
                let base = match pack.index.find(&base_oid) {
                    Some(base_offset) => self.resolve_header(pack, base_offset, depth + 1)?,
                    None => {
                        let (base_pack, base_offset) = self.locate(&base_oid).ok_or_else(|| {
                            Error::corrupt_object(base_oid, "delta base missing from packs")
                        })?;
                        self.resolve_header(&base_pack, base_offset, depth + 1)?
                    }
                };
                base.object_type
            }
        };

        // two size varints fit in 20 bytes
        let prefix = pack.inflate(&header, 20)?;
        let size = delta::result_size(&prefix).map_err(|error| pack.corrupt(offset, error))?;

        Ok(ObjectHeader::new(base_type, size))
    }

    fn scan(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.pack_dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut index_paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "idx")
                && path.with_extension("pack").is_file()
            {
                index_paths.push(path);
            }
        }
        index_paths.sort();

        Ok(index_paths)
    }
}

impl Backend for PackBackend {
    fn name(&self) -> &str {
        "pack"
    }

    fn read(&self, oid: &ObjectId) -> Result<Option<RawObject>> {
        let Some((pack, offset)) = self.locate(oid) else {
            return Ok(None);
        };

        let (object_type, data) = self.resolve(&pack, offset, 0)?;
        tracing::trace!(%oid, pack = %pack.path.display(), offset, "read packed object");

        Ok(Some(RawObject::new(object_type, data.into())))
    }

    fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectHeader>> {
        self.locate(oid)
            .map(|(pack, offset)| self.resolve_header(&pack, offset, 0))
            .transpose()
    }

    fn exists(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.packs().iter().any(|pack| pack.index.contains(oid)))
    }

    fn find_by_prefix(&self, prefix: &ShortObjectId) -> Result<Vec<ObjectId>> {
        Ok(self
            .packs()
            .iter()
            .flat_map(|pack| pack.index.find_by_prefix(prefix))
            .collect())
    }

    fn refresh(&self) -> Result<()> {
        let index_paths = self.scan()?;
        let current = self.packs();

        let mut packs = Vec::with_capacity(index_paths.len());
        for index_path in index_paths {
            let pack_path = index_path.with_extension("pack");
            match current.iter().find(|pack| pack.path == pack_path) {
                Some(pack) => packs.push(Arc::clone(pack)),
                None => {
                    let pack = Pack::open(&index_path)?;
                    tracing::debug!(
                        pack = %pack_path.display(),
                        objects = pack.index.len(),
                        "opened packfile"
                    );
                    packs.push(Arc::new(pack));
                }
            }
        }

        *self.packs.write().unwrap_or_else(PoisonError::into_inner) = packs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use assert_fs::TempDir;
    use byteorder::WriteBytesExt;
    use pretty_assertions::assert_eq;
    use sha1::{Digest, Sha1};
    use std::io::Write;

    enum TestEntry {
        Base(ObjectType, &'static [u8]),
        /// Base entry whose header claims `usize` bytes
        Mislabeled(ObjectType, usize, &'static [u8]),
        OfsDelta(usize, Vec<u8>),
        RefDelta(ObjectId, Vec<u8>),
    }

    fn entry_header(type_code: u8, size: usize) -> Vec<u8> {
        let mut header = Vec::new();
        let mut byte = (type_code << 4) | (size & 0x0f) as u8;
        let mut rest = size >> 4;
        while rest > 0 {
            header.push(byte | 0x80);
            byte = (rest & 0x7f) as u8;
            rest >>= 7;
        }
        header.push(byte);
        header
    }

    fn ofs_distance(mut distance: u64) -> Vec<u8> {
        let mut bytes = vec![(distance & 0x7f) as u8];
        distance >>= 7;
        while distance > 0 {
            distance -= 1;
            bytes.push(0x80 | (distance & 0x7f) as u8);
            distance >>= 7;
        }
        bytes.reverse();
        bytes
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Write `pack-test.pack` and a v2 index for it; `ids[i]` names entry `i`
    fn write_pack(dir: &Path, entries: &[TestEntry], ids: &[ObjectId]) {
        let mut pack = PACK_SIGNATURE.to_vec();
        pack.write_u32::<BigEndian>(2).unwrap();
        pack.write_u32::<BigEndian>(entries.len() as u32).unwrap();

        let mut offsets = Vec::new();
        for entry in entries {
            let offset = pack.len() as u64;
            offsets.push(offset);
            match entry {
                TestEntry::Base(object_type, data) => {
                    pack.extend(entry_header(object_type.pack_code(), data.len()));
                    pack.extend(deflate(data));
                }
                TestEntry::Mislabeled(object_type, size, data) => {
                    pack.extend(entry_header(object_type.pack_code(), *size));
                    pack.extend(deflate(data));
                }
                TestEntry::OfsDelta(base, patch) => {
                    pack.extend(entry_header(OFS_DELTA, patch.len()));
                    pack.extend(ofs_distance(offset - offsets[*base]));
                    pack.extend(deflate(patch));
                }
                TestEntry::RefDelta(base, patch) => {
                    pack.extend(entry_header(REF_DELTA, patch.len()));
                    pack.extend(base.as_bytes());
                    pack.extend(deflate(patch));
                }
            }
        }
        let pack_checksum = Sha1::digest(&pack);
        pack.extend(pack_checksum.as_slice());

        let mut sorted: Vec<_> = ids.iter().copied().zip(offsets).collect();
        sorted.sort();

        let mut idx = vec![0xff, b't', b'O', b'c'];
        idx.write_u32::<BigEndian>(2).unwrap();
        for byte in 0..=255u8 {
            let count = sorted.iter().filter(|(oid, _)| oid.as_bytes()[0] <= byte).count();
            idx.write_u32::<BigEndian>(count as u32).unwrap();
        }
        for (oid, _) in &sorted {
            idx.extend(oid.as_bytes());
        }
        for _ in &sorted {
            idx.write_u32::<BigEndian>(0).unwrap();
        }
        for (_, offset) in &sorted {
            idx.write_u32::<BigEndian>(*offset as u32).unwrap();
        }
        idx.extend(pack_checksum.as_slice());
        let idx_checksum = Sha1::digest(&idx);
        idx.extend(idx_checksum.as_slice());

        let pack_dir = dir.join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("pack-test.pack"), pack).unwrap();
        std::fs::write(pack_dir.join("pack-test.idx"), idx).unwrap();
    }

    #[test]
    fn reads_base_and_delta_entries() {
        let dir = TempDir::new().unwrap();
        let base: &[u8] = b"hello world";
        let base_oid = ObjectId::hash(ObjectType::Blob, base);
        // "hello " + "there"
        let patch = vec![11, 11, 0x90, 6, 5, b't', b'h', b'e', b'r', b'e'];
        let ofs_oid = ObjectId::hash(ObjectType::Blob, b"hello there");
        // "hello there" -> "hello"
        let second = vec![11, 5, 0x90, 5];
        let ref_oid = ObjectId::hash(ObjectType::Blob, b"hello");

        write_pack(
            dir.path(),
            &[
                TestEntry::Base(ObjectType::Blob, base),
                TestEntry::OfsDelta(0, patch),
                TestEntry::RefDelta(ofs_oid, second),
            ],
            &[base_oid, ofs_oid, ref_oid],
        );

        let backend = PackBackend::new(dir.path()).unwrap();

        assert_eq!(backend.pack_count(), 1);
        let raw = backend.read(&ofs_oid).unwrap().unwrap();
        assert_eq!(raw.object_type, ObjectType::Blob);
        assert_eq!(raw.data.as_ref(), b"hello there");
        assert_eq!(raw.oid(), ofs_oid);

        let raw = backend.read(&ref_oid).unwrap().unwrap();
        assert_eq!(raw.data.as_ref(), b"hello");
        assert_eq!(
            backend.read_header(&ref_oid).unwrap(),
            Some(ObjectHeader::new(ObjectType::Blob, 5))
        );
        assert!(backend.exists(&base_oid).unwrap());
        assert!(!backend.is_writable());
    }

    #[test]
    fn refresh_picks_up_new_packs() {
        let dir = TempDir::new().unwrap();
        let backend = PackBackend::new(dir.path()).unwrap();
        let oid = ObjectId::hash(ObjectType::Blob, b"late");
        assert_eq!(backend.read(&oid).unwrap(), None);

        write_pack(dir.path(), &[TestEntry::Base(ObjectType::Blob, b"late")], &[oid]);
        backend.refresh().unwrap();

        assert_eq!(backend.read(&oid).unwrap().unwrap().data.as_ref(), b"late");
        let found = backend
            .find_by_prefix(&ShortObjectId::try_parse(&oid.to_string()[..6]).unwrap())
            .unwrap();
        assert_eq!(found, vec![oid]);
    }

    #[test]
    fn writes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = PackBackend::new(dir.path()).unwrap();

        let error = backend
            .write(&RawObject::new(ObjectType::Blob, "x".into()))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn self_referencing_delta_chains_stop() {
        let dir = TempDir::new().unwrap();
        let oid = ObjectId::hash(ObjectType::Blob, b"loop");

        write_pack(dir.path(), &[TestEntry::RefDelta(oid, vec![4, 4, 0x90, 4])], &[oid]);
        let backend = PackBackend::new(dir.path()).unwrap();

        let error = backend.read(&oid).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CorruptObject);
    }

    #[test]
    fn oversized_entry_headers_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let oid = ObjectId::hash(ObjectType::Blob, b"small");

        write_pack(
            dir.path(),
            &[TestEntry::Mislabeled(ObjectType::Blob, 1 << 56, b"small")],
            &[oid],
        );
        let backend = PackBackend::new(dir.path()).unwrap();

        let error = backend.read(&oid).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CorruptObject);
    }
}
