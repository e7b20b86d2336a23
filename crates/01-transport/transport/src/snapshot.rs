//! Read-only copy of a channel file, taken without mapping it.

use crate::header::{Command, Header, HEADER_SIZE};
use crate::side_channel::{parse_messages, SideChannelFrames};
use crate::world_section::{world_entries, world_payload, WorldEntries};
use crate::{TransportError, TransportResult};
use std::path::Path;

/// Bytes of a channel file plus its parsed header.
///
/// Reading a snapshot never clears side-channel data or flips the turn, so it
/// is safe to take while both ends are running.
#[derive(Clone, Debug)]
pub struct ChannelSnapshot {
    header: Header,
    bytes: Vec<u8>,
}

impl ChannelSnapshot {
    /// Reads and parses the file at `path`.
    pub fn read(path: impl AsRef<Path>) -> TransportResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| TransportError::io(path, err))?;
        Self::from_bytes(bytes)
    }

    /// Parses an in-memory copy of a channel file.
    pub fn from_bytes(bytes: Vec<u8>) -> TransportResult<Self> {
        let header = Header::parse(&bytes)?;
        Ok(Self { header, bytes })
    }

    /// Parsed header fields.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Command byte as a [`Command`]; fails on unknown values.
    pub fn command(&self) -> TransportResult<Command> {
        self.header.command()
    }

    /// Valid side-channel bytes.
    pub fn side_channel_data(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..HEADER_SIZE + self.header.side_channel_size]
    }

    /// Frames in the side-channel region, without clearing them.
    pub fn side_channel_messages(&self) -> SideChannelFrames<'_> {
        parse_messages(self.side_channel_data())
    }

    /// The world payload behind its size prefix.
    pub fn world_payload(&self) -> TransportResult<&[u8]> {
        world_payload(&self.bytes, &self.header)
    }

    /// Named world entries in payload order.
    pub fn worlds(&self) -> TransportResult<WorldEntries<'_>> {
        world_entries(self.world_payload()?)
    }
}
