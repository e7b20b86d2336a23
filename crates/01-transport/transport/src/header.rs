//! Fixed 18-byte header at the start of every mapped file.
//!
//! ```text
//! 0   i32  total mapped capacity
//! 4   i32  protocol version
//! 8   u8   ready flag (1 = simulation's turn, 0 = trainer's turn)
//! 9   i8   command
//! 10  i32  side-channel capacity
//! 14  i32  side-channel data size
//! 18  ...  side-channel region, then i32 world payload size + world payload
//! ```
//!
//! All integers are little-endian.

use crate::{TransportError, TransportResult};

/// Version tag written by this implementation.
pub const API_VERSION: i32 = 0;
/// Offset of the total capacity field.
pub const CAPACITY_OFFSET: usize = 0;
/// Offset of the version field.
pub const VERSION_OFFSET: usize = 4;
/// Offset of the ready flag.
pub const READY_FLAG_OFFSET: usize = 8;
/// Offset of the command byte.
pub const COMMAND_OFFSET: usize = 9;
/// Offset of the side-channel capacity field.
pub const SIDE_CHANNEL_CAPACITY_OFFSET: usize = 10;
/// Offset of the side-channel data size field.
pub const SIDE_CHANNEL_SIZE_OFFSET: usize = 14;
/// Size of the fixed header; the side-channel region starts here.
pub const HEADER_SIZE: usize = 18;
/// Size of the world payload length prefix.
pub const WORLD_SIZE_FIELD: usize = 4;

/// Control byte exchanged alongside the ready flag.
#[repr(i8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// Normal step.
    Default = 0,
    /// The data moved to `path + suffix`; the reader deletes this file.
    ChangeFile = 1,
    /// The peer is shutting down.
    Close = 2,
    /// The peer requests an environment reset.
    Reset = 3,
}

impl TryFrom<i8> for Command {
    type Error = TransportError;

    fn try_from(value: i8) -> TransportResult<Self> {
        match value {
            0 => Ok(Command::Default),
            1 => Ok(Command::ChangeFile),
            2 => Ok(Command::Close),
            3 => Ok(Command::Reset),
            other => Err(TransportError::Protocol(format!(
                "unknown command byte {other}"
            ))),
        }
    }
}

/// Which end of the channel this process is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Writes world data, reads actions and commands.
    Simulation,
    /// Reads world data, writes actions and commands.
    Trainer,
}

impl Role {
    /// Ready-flag value meaning "this role may read and write".
    pub fn turn_value(self) -> u8 {
        match self {
            Role::Simulation => 1,
            Role::Trainer => 0,
        }
    }

    /// The other end.
    pub fn peer(self) -> Role {
        match self {
            Role::Simulation => Role::Trainer,
            Role::Trainer => Role::Simulation,
        }
    }
}

/// Decoded header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Total bytes the file declares.
    pub capacity: usize,
    /// Protocol version tag.
    pub version: i32,
    /// Raw ready flag.
    pub ready_flag: u8,
    /// Raw command byte; see [`Header::command`].
    pub command: i8,
    /// Reserved side-channel bytes.
    pub side_channel_capacity: usize,
    /// Valid side-channel bytes.
    pub side_channel_size: usize,
}

impl Header {
    /// Parses and bounds-checks the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> TransportResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::Protocol(format!(
                "file of {} bytes is shorter than the {HEADER_SIZE}-byte header",
                bytes.len()
            )));
        }
        let header = Header {
            capacity: read_len(bytes, CAPACITY_OFFSET, "capacity")?,
            version: read_i32(bytes, VERSION_OFFSET),
            ready_flag: bytes[READY_FLAG_OFFSET],
            command: bytes[COMMAND_OFFSET] as i8,
            side_channel_capacity: read_len(
                bytes,
                SIDE_CHANNEL_CAPACITY_OFFSET,
                "side-channel capacity",
            )?,
            side_channel_size: read_len(bytes, SIDE_CHANNEL_SIZE_OFFSET, "side-channel size")?,
        };

        if header.capacity > bytes.len() {
            return Err(TransportError::Protocol(format!(
                "header declares {} bytes but only {} are mapped",
                header.capacity,
                bytes.len()
            )));
        }
        if header.side_channel_size > header.side_channel_capacity {
            return Err(TransportError::Protocol(format!(
                "side-channel size {} exceeds its capacity {}",
                header.side_channel_size, header.side_channel_capacity
            )));
        }
        if header.world_section_offset() > header.capacity {
            return Err(TransportError::Protocol(format!(
                "side-channel capacity {} overruns a {}-byte file",
                header.side_channel_capacity, header.capacity
            )));
        }
        Ok(header)
    }

    /// Decoded command byte.
    pub fn command(&self) -> TransportResult<Command> {
        Command::try_from(self.command)
    }

    /// Offset of the world payload size field.
    pub fn world_section_offset(&self) -> usize {
        HEADER_SIZE + self.side_channel_capacity
    }

    /// Bytes available to the world payload, excluding its size prefix.
    pub fn world_capacity(&self) -> usize {
        self.capacity
            .saturating_sub(self.world_section_offset() + WORLD_SIZE_FIELD)
    }
}

pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn write_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Reads a non-negative `i32` length field.
pub(crate) fn read_len(bytes: &[u8], offset: usize, what: &str) -> TransportResult<usize> {
    let value = read_i32(bytes, offset);
    usize::try_from(value)
        .map_err(|_| TransportError::Protocol(format!("negative {what} {value} at offset {offset}")))
}

/// Converts a length to the `i32` the wire format stores.
pub(crate) fn wire_len(len: usize) -> TransportResult<i32> {
    i32::try_from(len).map_err(|_| TransportError::InvalidCapacity {
        requested: len,
        minimum: HEADER_SIZE + WORLD_SIZE_FIELD,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(capacity: i32, side_capacity: i32, side_size: i32) -> Vec<u8> {
        let mut bytes = vec![0u8; capacity.max(HEADER_SIZE as i32) as usize];
        write_i32(&mut bytes, CAPACITY_OFFSET, capacity);
        write_i32(&mut bytes, VERSION_OFFSET, API_VERSION);
        bytes[READY_FLAG_OFFSET] = 1;
        bytes[COMMAND_OFFSET] = Command::Reset as i8 as u8;
        write_i32(&mut bytes, SIDE_CHANNEL_CAPACITY_OFFSET, side_capacity);
        write_i32(&mut bytes, SIDE_CHANNEL_SIZE_OFFSET, side_size);
        bytes
    }

    #[test]
    fn parses_little_endian_fields() {
        let header = Header::parse(&header_bytes(64, 10, 3)).expect("header");
        assert_eq!(header.capacity, 64);
        assert_eq!(header.version, API_VERSION);
        assert_eq!(header.ready_flag, 1);
        assert_eq!(header.command().expect("command"), Command::Reset);
        assert_eq!(header.world_section_offset(), 28);
        assert_eq!(header.world_capacity(), 32);
    }

    #[test]
    fn rejects_inconsistent_sizes() {
        assert!(matches!(
            Header::parse(&[0u8; 4]),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            Header::parse(&header_bytes(64, 10, 11)),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            Header::parse(&header_bytes(32, 40, 0)),
            Err(TransportError::Protocol(_))
        ));
        let mut truncated = header_bytes(64, 0, 0);
        truncated.truncate(40);
        assert!(matches!(
            Header::parse(&truncated),
            Err(TransportError::Protocol(_))
        ));
    }

    #[test]
    fn command_bytes_round_trip() {
        for command in [
            Command::Default,
            Command::ChangeFile,
            Command::Close,
            Command::Reset,
        ] {
            assert_eq!(Command::try_from(command as i8).expect("command"), command);
        }
        assert!(Command::try_from(9).is_err());
    }

    #[test]
    fn roles_take_opposite_turns() {
        assert_eq!(Role::Simulation.turn_value(), 1);
        assert_eq!(Role::Trainer.turn_value(), 0);
        assert_eq!(Role::Simulation.peer(), Role::Trainer);
    }
}
