//! Git delta instruction stream
//!
//! A delta starts with the base size and result size (little-endian base-128
//! varints), followed by instructions:
//!
//! - `1xxxxxxx`: copy from base. The low 4 bits select offset bytes, the next
//!   3 bits select size bytes; a size of 0 means 0x10000.
//! - `0xxxxxxx`: insert the next `x` bytes literally (`x` > 0).

use crate::errors::{Error, Result};

/// Read a delta size varint, returning the value and the bytes consumed
pub fn read_size(data: &[u8]) -> Result<(usize, usize)> {
    let mut value = 0usize;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if shift > 63 {
            break;
        }
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(Error::malformed("truncated delta size"))
}

/// Target size declared by a delta, without applying it
pub fn result_size(delta: &[u8]) -> Result<usize> {
    let (_, consumed) = read_size(delta)?;
    let (size, _) = read_size(&delta[consumed..])?;
    Ok(size)
}

fn push_chunk(result: &mut Vec<u8>, chunk: &[u8], result_size: usize) -> Result<()> {
    if result.len() + chunk.len() > result_size {
        return Err(Error::malformed(format!(
            "delta writes past its declared size of {result_size} bytes"
        )));
    }
    result.extend_from_slice(chunk);
    Ok(())
}

pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let (base_size, mut pos) = read_size(delta)?;
    if base_size != base.len() {
        return Err(Error::malformed(format!(
            "delta expects a base of {base_size} bytes, got {}",
            base.len()
        )));
    }

    let (result_size, consumed) = read_size(&delta[pos..])?;
    pos += consumed;

    // declared sizes are untrusted
    let mut result = Vec::with_capacity(result_size.min(base.len() + delta.len()));

    while pos < delta.len() {
        let opcode = delta[pos];
        pos += 1;

        if opcode & 0x80 != 0 {
            let mut offset = 0usize;
            let mut size = 0usize;

            for bit in 0..4 {
                if opcode & (1 << bit) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| Error::malformed("truncated delta copy offset"))?;
                    offset |= (byte as usize) << (8 * bit);
                    pos += 1;
                }
            }
            for bit in 0..3 {
                if opcode & (0x10 << bit) != 0 {
                    let byte = *delta
                        .get(pos)
                        .ok_or_else(|| Error::malformed("truncated delta copy size"))?;
                    size |= (byte as usize) << (8 * bit);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            let chunk = offset
                .checked_add(size)
                .and_then(|end| base.get(offset..end))
                .ok_or_else(|| Error::malformed("delta copies past the end of its base"))?;
            push_chunk(&mut result, chunk, result_size)?;
        } else if opcode != 0 {
            let size = opcode as usize;
            let chunk = delta
                .get(pos..pos + size)
                .ok_or_else(|| Error::malformed("truncated delta insert"))?;
            push_chunk(&mut result, chunk, result_size)?;
            pos += size;
        } else {
            return Err(Error::malformed("reserved delta opcode 0"));
        }
    }

    if result.len() != result_size {
        return Err(Error::malformed(format!(
            "delta produced {} bytes instead of {result_size}",
            result.len()
        )));
    }

    Ok(result)
}
