//! One zlib-compressed file per object under `objects/xx/yyyy...`

use crate::artifacts::database::backend::Backend;
use crate::artifacts::database::raw_object::{ObjectHeader, RawObject};
use crate::artifacts::objects::object_id::{ObjectId, ShortObjectId};
use crate::errors::{Error, Result};
use bytes::Bytes;
use fake::rand;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Longest header we expect: "commit " + 20 digits + NUL
const MAX_HEADER_SIZE: usize = 32;

#[derive(Debug)]
pub struct LooseBackend {
    path: Box<Path>,
}

impl LooseBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LooseBackend {
            path: path.into().into_boxed_path(),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.path.join(oid.to_path())
    }

    fn read_object(&self, object_path: &Path) -> Result<Option<Bytes>> {
        let object_content = match std::fs::read(object_path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        Self::decompress(&object_content).map(Some)
    }

    fn write_object(&self, object_path: &Path, object_content: &[u8]) -> Result<()> {
        let object_dir = object_path.parent().ok_or_else(|| {
            Error::invalid_argument(format!("invalid object path {}", object_path.display()))
        })?;
        std::fs::create_dir_all(object_dir)?;

        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let object_content = Self::compress(object_content)?;

        // write next to the final location, then rename to make the write atomic
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)?;
        let written = file
            .write_all(&object_content)
            .and_then(|_| file.sync_all())
            .and_then(|_| std::fs::rename(&temp_object_path, object_path));

        if let Err(error) = written {
            let _ = std::fs::remove_file(&temp_object_path);
            return Err(error.into());
        }

        Ok(())
    }

    fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data)?;

        Ok(encoder.finish()?)
    }

    fn decompress(data: &[u8]) -> Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .map_err(|error| Error::malformed(format!("unable to inflate object: {error}")))?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }
}

impl Backend for LooseBackend {
    fn name(&self) -> &str {
        "loose"
    }

    fn read(&self, oid: &ObjectId) -> Result<Option<RawObject>> {
        self.read_object(&self.object_path(oid))?
            .map(|content| RawObject::from_loose_format(&content).map_err(|e| e.at_object(oid)))
            .transpose()
    }

    fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectHeader>> {
        let file = match std::fs::File::open(self.object_path(oid)) {
            Ok(file) => file,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        // inflate only as much as the header needs
        let mut decoder = flate2::read::ZlibDecoder::new(file).take(MAX_HEADER_SIZE as u64);
        let mut header = Vec::with_capacity(MAX_HEADER_SIZE);
        decoder
            .read_to_end(&mut header)
            .map_err(|error| Error::corrupt_object(oid, format!("unable to inflate: {error}")))?;

        let null_pos = header
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt_object(oid, "no NUL terminator in object header"))?;

        ObjectHeader::parse(&header[..null_pos])
            .map(Some)
            .map_err(|e| e.at_object(oid))
    }

    fn exists(&self, oid: &ObjectId) -> Result<bool> {
        Ok(self.object_path(oid).is_file())
    }

    fn write(&self, raw: &RawObject) -> Result<ObjectId> {
        let oid = raw.oid();
        let object_path = self.object_path(&oid);

        // write the object to disk unless it already exists
        if !object_path.exists() {
            self.write_object(&object_path, &raw.to_loose_format())?;
            tracing::trace!(%oid, object_type = %raw.object_type, "wrote loose object");
        }

        Ok(oid)
    }

    fn is_writable(&self) -> bool {
        true
    }

    /// - For prefixes of 2+ characters, only searches the specific directory
    /// - Shorter prefixes are rejected by `ShortObjectId` already
    fn find_by_prefix(&self, prefix: &ShortObjectId) -> Result<Vec<ObjectId>> {
        let (dir_name, file_prefix) = prefix.as_ref().split_at(2);
        let dir_path = self.path.join(dir_name);

        let entries = match std::fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let file_name = entry?.file_name();
            let file_name = file_name.to_string_lossy();

            if file_name.starts_with(file_prefix)
                && let Ok(oid) = ObjectId::try_parse(format!("{dir_name}{file_name}"))
            {
                matches.push(oid);
            }
        }

        Ok(matches)
    }
}
