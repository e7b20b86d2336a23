//! Named world blocks inside the world payload.
//!
//! ```text
//! i32 world_count
//! repeated world_count times:
//!   u8   name length
//!   [u8; 63] ASCII name, zero padded
//!   i32  block length
//!   [u8] block
//! ```
//!
//! The block bytes are opaque here; the world codec owns their layout.

use crate::header::{read_len, write_i32, wire_len, Header, WORLD_SIZE_FIELD};
use crate::{TransportError, TransportResult};

/// Bytes reserved for a world name, including its length byte.
pub const WORLD_NAME_FIELD: usize = 64;
/// Longest accepted world name.
pub const MAX_WORLD_NAME_LEN: usize = WORLD_NAME_FIELD - 1;
const COUNT_FIELD: usize = 4;
const BLOCK_LEN_FIELD: usize = 4;

/// Serialized world data handed to [`SharedMemoryChannel::write_world_payload`](crate::SharedMemoryChannel::write_world_payload).
pub trait WorldPayload {
    /// Exact number of bytes [`encode_into`](Self::encode_into) writes.
    fn encoded_len(&self) -> usize;

    /// Writes the block into `out`, which is exactly `encoded_len` bytes.
    ///
    /// When the block is rewritten in place, bytes the encoder skips keep the
    /// contents the peer last wrote there.
    fn encode_into(&self, out: &mut [u8]);
}

/// One named block inside a world payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorldEntry<'a> {
    /// Registered world name.
    pub name: &'a str,
    /// Offset of the block inside the payload.
    pub block_offset: usize,
    /// Block bytes.
    pub block: &'a [u8],
}

/// Checks that `name` fits the fixed name field.
pub fn validate_world_name(name: &str) -> TransportResult<()> {
    if name.is_empty() || name.len() > MAX_WORLD_NAME_LEN || !name.is_ascii() {
        return Err(TransportError::InvalidWorldName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Iterates the entries of a world payload. An empty payload holds no worlds.
pub fn world_entries(payload: &[u8]) -> TransportResult<WorldEntries<'_>> {
    let remaining = if payload.is_empty() {
        0
    } else if payload.len() < COUNT_FIELD {
        return Err(truncated("world count", COUNT_FIELD, payload.len()));
    } else {
        read_len(payload, 0, "world count")?
    };
    Ok(WorldEntries {
        payload,
        cursor: COUNT_FIELD.min(payload.len()),
        remaining,
    })
}

/// Iterator returned by [`world_entries`]. Stops after the first error.
#[derive(Debug, Clone)]
pub struct WorldEntries<'a> {
    payload: &'a [u8],
    cursor: usize,
    remaining: usize,
}

impl<'a> WorldEntries<'a> {
    fn next_entry(&mut self) -> TransportResult<WorldEntry<'a>> {
        let start = self.cursor;
        let fixed = WORLD_NAME_FIELD + BLOCK_LEN_FIELD;
        if self.payload.len() < start + fixed {
            return Err(truncated("world entry header", start + fixed, self.payload.len()));
        }
        let name_len = self.payload[start] as usize;
        if name_len > MAX_WORLD_NAME_LEN {
            return Err(TransportError::Protocol(format!(
                "world name length {name_len} exceeds {MAX_WORLD_NAME_LEN}"
            )));
        }
        let name = std::str::from_utf8(&self.payload[start + 1..start + 1 + name_len])
            .map_err(|_| TransportError::Protocol("world name is not valid UTF-8".to_owned()))?;
        let block_len = read_len(self.payload, start + WORLD_NAME_FIELD, "world block length")?;
        let block_offset = start + fixed;
        let end = block_offset + block_len;
        if self.payload.len() < end {
            return Err(truncated("world block", end, self.payload.len()));
        }
        self.cursor = end;
        Ok(WorldEntry {
            name,
            block_offset,
            block: &self.payload[block_offset..end],
        })
    }
}

impl<'a> Iterator for WorldEntries<'a> {
    type Item = TransportResult<WorldEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let entry = self.next_entry();
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}

/// Locates `name`, returning the block's offset and length inside the payload.
pub fn find_world(payload: &[u8], name: &str) -> TransportResult<Option<(usize, usize)>> {
    for entry in world_entries(payload)? {
        let entry = entry?;
        if entry.name == name {
            return Ok(Some((entry.block_offset, entry.block.len())));
        }
    }
    Ok(None)
}

/// Returns the world payload of a whole mapped file, bounds-checked.
pub(crate) fn world_payload<'a>(bytes: &'a [u8], header: &Header) -> TransportResult<&'a [u8]> {
    let (start, len) = world_payload_range(bytes, header)?;
    Ok(&bytes[start..start + len])
}

/// Offset and length of the world payload inside a mapped file.
pub(crate) fn world_payload_range(bytes: &[u8], header: &Header) -> TransportResult<(usize, usize)> {
    let size_offset = header.world_section_offset();
    if size_offset + WORLD_SIZE_FIELD > header.capacity {
        return Err(truncated("world payload size", size_offset + WORLD_SIZE_FIELD, header.capacity));
    }
    let len = read_len(bytes, size_offset, "world payload size")?;
    let start = size_offset + WORLD_SIZE_FIELD;
    if len > header.world_capacity() {
        return Err(truncated("world payload", start + len, header.capacity));
    }
    Ok((start, len))
}

/// Size of a payload holding blocks of the given lengths.
pub(crate) fn payload_len(block_lens: impl IntoIterator<Item = usize>) -> usize {
    COUNT_FIELD
        + block_lens
            .into_iter()
            .map(|len| WORLD_NAME_FIELD + BLOCK_LEN_FIELD + len)
            .sum::<usize>()
}

/// Incrementally writes a payload into a pre-sized buffer.
pub(crate) struct PayloadWriter<'a> {
    out: &'a mut [u8],
    cursor: usize,
    count: i32,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn new(out: &'a mut [u8]) -> Self {
        Self {
            out,
            cursor: COUNT_FIELD,
            count: 0,
        }
    }

    /// Appends a named entry and returns the block slice for the caller to fill.
    pub(crate) fn push(&mut self, name: &str, block_len: usize) -> TransportResult<&mut [u8]> {
        let start = self.cursor;
        let name_field = &mut self.out[start..start + WORLD_NAME_FIELD];
        name_field.fill(0);
        name_field[0] = name.len() as u8;
        name_field[1..1 + name.len()].copy_from_slice(name.as_bytes());
        write_i32(self.out, start + WORLD_NAME_FIELD, wire_len(block_len)?);
        let block_offset = start + WORLD_NAME_FIELD + BLOCK_LEN_FIELD;
        self.cursor = block_offset + block_len;
        self.count += 1;
        Ok(&mut self.out[block_offset..self.cursor])
    }

    pub(crate) fn finish(self) -> usize {
        write_i32(self.out, 0, self.count);
        self.cursor
    }
}

fn truncated(what: &str, needed: usize, available: usize) -> TransportError {
    TransportError::Protocol(format!(
        "{what} needs {needed} bytes but the payload holds {available}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(worlds: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = vec![0u8; payload_len(worlds.iter().map(|(_, block)| block.len()))];
        let mut writer = PayloadWriter::new(&mut out);
        for (name, block) in worlds {
            writer
                .push(name, block.len())
                .expect("push")
                .copy_from_slice(block);
        }
        let written = writer.finish();
        assert_eq!(written, out.len());
        out
    }

    #[test]
    fn entries_come_back_in_order() {
        let bytes = payload(&[("walker", &[1, 2, 3]), ("crawler", &[])]);
        let entries: Vec<_> = world_entries(&bytes)
            .expect("entries")
            .collect::<TransportResult<_>>()
            .expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "walker");
        assert_eq!(entries[0].block, &[1, 2, 3]);
        assert_eq!(entries[1].name, "crawler");
        assert!(entries[1].block.is_empty());
        assert_eq!(
            find_world(&bytes, "crawler").expect("find"),
            Some((entries[1].block_offset, 0))
        );
        assert_eq!(find_world(&bytes, "absent").expect("find"), None);
    }

    #[test]
    fn empty_payload_has_no_worlds() {
        assert_eq!(world_entries(&[]).expect("entries").count(), 0);
    }

    #[test]
    fn truncated_block_is_a_protocol_error() {
        let mut bytes = payload(&[("walker", &[1, 2, 3, 4])]);
        bytes.truncate(bytes.len() - 2);
        let mut entries = world_entries(&bytes).expect("entries");
        assert!(matches!(entries.next(), Some(Err(TransportError::Protocol(_)))));
        assert!(entries.next().is_none());
    }

    #[test]
    fn names_must_fit_the_fixed_field() {
        assert!(validate_world_name("ok").is_ok());
        assert!(validate_world_name(&"x".repeat(MAX_WORLD_NAME_LEN)).is_ok());
        assert!(validate_world_name(&"x".repeat(MAX_WORLD_NAME_LEN + 1)).is_err());
        assert!(validate_world_name("").is_err());
        assert!(validate_world_name("wörld").is_err());
    }
}
