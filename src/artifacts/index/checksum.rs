//! SHA-1 running checksum over an index stream

use crate::artifacts::index::CHECKSUM_SIZE;
use crate::errors::{Error, Result};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

#[derive(Debug)]
pub struct Checksum<S> {
    stream: S,
    digest: Sha1,
}

impl<S> Checksum<S> {
    pub fn new(stream: S) -> Self {
        Checksum {
            stream,
            digest: Sha1::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> Checksum<S> {
    pub fn read(&mut self, size: usize) -> Result<Bytes> {
        let mut buffer = vec![0; size];
        self.stream
            .read_exact(&mut buffer)
            .map_err(|_| Error::corrupt_index("unexpected end-of-file while reading index"))?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    /// Read up to and including the next NUL, returning the bytes before it
    pub fn read_until_nul(&mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read(1)?;
            if byte[0] == 0 {
                return Ok(bytes);
            }
            bytes.push(byte[0]);
        }
    }

    /// Compare the trailing checksum against everything read so far
    pub fn verify(&mut self) -> Result<()> {
        let mut expected_checksum = [0u8; CHECKSUM_SIZE];
        self.stream
            .read_exact(&mut expected_checksum)
            .map_err(|_| Error::corrupt_index("missing trailing checksum"))?;

        let actual_checksum = self.digest.clone().finalize();
        if expected_checksum != actual_checksum.as_slice() {
            return Err(Error::corrupt_index(
                "checksum does not match value stored on disk",
            ));
        }

        Ok(())
    }
}

impl<S: Write> Checksum<S> {
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub fn write_checksum(&mut self) -> Result<()> {
        let checksum = self.digest.clone().finalize();
        self.stream.write_all(checksum.as_slice())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::io::Cursor;

    #[test]
    fn written_checksums_verify() {
        let mut writer = Checksum::new(Vec::new());
        writer.write(b"DIRC").unwrap();
        writer.write(b"abc\0").unwrap();
        writer.write_checksum().unwrap();
        let bytes = writer.into_inner();

        let mut reader = Checksum::new(Cursor::new(bytes));
        assert_eq!(reader.read(4).unwrap().as_ref(), b"DIRC");
        assert_eq!(reader.read_until_nul().unwrap(), b"abc");
        reader.verify().unwrap();
    }

    #[test]
    fn tampering_is_detected() {
        let mut writer = Checksum::new(Vec::new());
        writer.write(b"DIRC").unwrap();
        writer.write_checksum().unwrap();
        let mut bytes = writer.into_inner();
        bytes[0] = b'X';

        let mut reader = Checksum::new(Cursor::new(bytes));
        reader.read(4).unwrap();
        assert_eq!(reader.verify().unwrap_err().kind(), ErrorKind::CorruptIndex);
    }
}
