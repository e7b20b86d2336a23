//! The turn-based channel over one mapped file.
//!
//! Exactly one side owns the file contents at a time: the one whose turn value
//! is stored in the ready flag. Writers check the turn before touching the
//! mapping, and [`SharedMemoryChannel::hand_over`] publishes everything written
//! so far with a release store on the flag.
//!
//! When data outgrows the file, the writer creates `path + suffix`, copies the
//! live contents over, and leaves `CHANGE_FILE` in the old file for the peer.
//! The peer follows the hand-off the next time it polls and deletes the old
//! file.

use crate::config::ChannelConfig;
use crate::header::{
    wire_len, write_i32, Command, Header, Role, CAPACITY_OFFSET, COMMAND_OFFSET,
    HEADER_SIZE, SIDE_CHANNEL_CAPACITY_OFFSET, SIDE_CHANNEL_SIZE_OFFSET, VERSION_OFFSET,
    WORLD_SIZE_FIELD,
};
use crate::region::MappedFile;
use crate::wait::Backoff;
use crate::world_section::{
    find_world, payload_len, validate_world_name, world_entries, world_payload,
    world_payload_range, PayloadWriter, WorldPayload,
};
use crate::{TransportError, TransportResult};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};

/// Extra bytes added on top of twice the required size when a file grows.
const GROWTH_SLACK: usize = 20;

/// Outcome of a non-blocking [`SharedMemoryChannel::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Advance {
    /// The peer still holds the turn.
    Pending,
    /// It is our turn; the peer left this command.
    Ready(Command),
}

/// One end of the shared-memory exchange.
#[derive(Debug)]
pub struct SharedMemoryChannel {
    file: MappedFile,
    role: Role,
    config: ChannelConfig,
}

impl SharedMemoryChannel {
    /// Creates a fresh file at `path` and starts on this side's turn.
    ///
    /// The file is deleted when the channel is dropped.
    pub fn create(
        path: impl AsRef<Path>,
        side_channel_capacity: usize,
        world_capacity: usize,
        role: Role,
        config: ChannelConfig,
    ) -> TransportResult<Self> {
        let path = path.as_ref();
        let total = total_len(side_channel_capacity, world_capacity)?;
        let mut file = MappedFile::create(path, total)?;
        let bytes = file.as_mut_slice();
        write_i32(bytes, CAPACITY_OFFSET, wire_len(total)?);
        write_i32(bytes, VERSION_OFFSET, config.api_version);
        bytes[COMMAND_OFFSET] = Command::Default as i8 as u8;
        write_i32(
            bytes,
            SIDE_CHANNEL_CAPACITY_OFFSET,
            wire_len(side_channel_capacity)?,
        );
        write_i32(bytes, SIDE_CHANNEL_SIZE_OFFSET, 0);
        write_i32(bytes, HEADER_SIZE + side_channel_capacity, 0);
        file.store_ready_flag(role.turn_value());
        debug!(
            path = %path.display(),
            ?role,
            side_channel_capacity,
            world_capacity,
            "created shared memory channel"
        );
        Ok(Self { file, role, config })
    }

    /// Opens a file the peer created.
    pub fn open(path: impl AsRef<Path>, role: Role, config: ChannelConfig) -> TransportResult<Self> {
        let file = MappedFile::open(path.as_ref())?;
        let header = Header::parse(file.as_slice())?;
        if header.version != config.api_version {
            return Err(TransportError::VersionMismatch {
                expected: config.api_version,
                found: header.version,
            });
        }
        debug!(path = %path.as_ref().display(), ?role, capacity = header.capacity, "opened shared memory channel");
        Ok(Self { file, role, config })
    }

    /// Which end this is.
    pub fn role(&self) -> Role {
        self.role
    }

    /// File currently mapped. Changes after a hand-off.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Configuration the channel was built with.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Current header; the ready flag is read with acquire ordering.
    pub fn header(&self) -> TransportResult<Header> {
        let mut header = Header::parse(self.file.as_slice())?;
        header.ready_flag = self.file.load_ready_flag();
        Ok(header)
    }

    /// Returns true when this side may read and write the file.
    pub fn is_my_turn(&self) -> bool {
        self.file.load_ready_flag() == self.role.turn_value()
    }

    /// Polls once. Follows `CHANGE_FILE` hand-offs until a real command shows up.
    pub fn advance(&mut self) -> TransportResult<Advance> {
        loop {
            if !self.is_my_turn() {
                return Ok(Advance::Pending);
            }
            match self.header()?.command()? {
                Command::ChangeFile => self.follow_handoff()?,
                command => return Ok(Advance::Ready(command)),
            }
        }
    }

    /// Polls with backoff until the peer hands the turn back.
    pub fn wait_for_turn(&mut self) -> TransportResult<Command> {
        let timeout = self.config.poll.timeout();
        let started = Instant::now();
        let mut backoff = Backoff::new(self.config.poll);
        loop {
            if let Advance::Ready(command) = self.advance()? {
                return Ok(command);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(TransportError::TimedOut { waited });
            }
            backoff.snooze();
        }
    }

    /// Leaves `command` for the peer and gives it the turn.
    pub fn hand_over(&mut self, command: Command) -> TransportResult<()> {
        self.ensure_turn("hand over")?;
        self.file.as_mut_slice()[COMMAND_OFFSET] = command as i8 as u8;
        self.file.store_ready_flag(self.role.peer().turn_value());
        trace!(?command, "handed turn to peer");
        Ok(())
    }

    /// Writes the block registered as `name`, adding it if it is new.
    ///
    /// A block with the same length as last time is re-encoded in place, so
    /// bytes the encoder skips (the peer's actions) survive. Otherwise the
    /// payload is rebuilt, growing the file if it no longer fits.
    pub fn write_world_payload<P: WorldPayload + ?Sized>(
        &mut self,
        name: &str,
        payload: &P,
    ) -> TransportResult<()> {
        validate_world_name(name)?;
        self.ensure_turn("write world data")?;
        let header = self.header()?;
        let (payload_start, _) = world_payload_range(self.file.as_slice(), &header)?;
        let block_len = payload.encoded_len();

        let existing = find_world(world_payload(self.file.as_slice(), &header)?, name)?;
        if let Some((offset, len)) = existing {
            if len == block_len {
                let start = payload_start + offset;
                payload.encode_into(&mut self.file.as_mut_slice()[start..start + block_len]);
                return Ok(());
            }
        }

        // Copy the other blocks out before the payload is rewritten.
        let mut blocks: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        for entry in world_entries(world_payload(self.file.as_slice(), &header)?)? {
            let entry = entry?;
            if entry.name == name {
                blocks.push((name.to_owned(), None));
            } else {
                blocks.push((entry.name.to_owned(), Some(entry.block.to_vec())));
            }
        }
        if existing.is_none() {
            debug!(world = name, block_len, "registering world");
            blocks.push((name.to_owned(), None));
        }

        let required = payload_len(
            blocks
                .iter()
                .map(|(_, block)| block.as_ref().map_or(block_len, Vec::len)),
        );
        if required > header.world_capacity() {
            self.relocate(
                header.side_channel_capacity,
                required * 2 + GROWTH_SLACK,
            )?;
        }

        let header = self.header()?;
        let size_offset = header.world_section_offset();
        let start = size_offset + WORLD_SIZE_FIELD;
        let bytes = self.file.as_mut_slice();
        let mut writer = PayloadWriter::new(&mut bytes[start..start + required]);
        for (block_name, block) in &blocks {
            match block {
                Some(block) => writer.push(block_name, block.len())?.copy_from_slice(block),
                None => {
                    let out = writer.push(block_name, block_len)?;
                    out.fill(0);
                    payload.encode_into(out);
                }
            }
        }
        let written = writer.finish();
        write_i32(bytes, size_offset, wire_len(written)?);
        Ok(())
    }

    /// Block registered as `name`, if any.
    pub fn world_block(&self, name: &str) -> TransportResult<Option<&[u8]>> {
        let header = self.header()?;
        let payload = world_payload(self.file.as_slice(), &header)?;
        Ok(find_world(payload, name)?.map(|(offset, len)| &payload[offset..offset + len]))
    }

    /// Mutable block registered as `name`; only on this side's turn.
    pub fn world_block_mut(&mut self, name: &str) -> TransportResult<Option<&mut [u8]>> {
        self.ensure_turn("write world data")?;
        let header = self.header()?;
        let (start, _) = world_payload_range(self.file.as_slice(), &header)?;
        let found = find_world(world_payload(self.file.as_slice(), &header)?, name)?;
        match found {
            Some((offset, len)) => {
                let begin = start + offset;
                Ok(Some(&mut self.file.as_mut_slice()[begin..begin + len]))
            }
            None => Ok(None),
        }
    }

    /// Names of the registered worlds, in payload order.
    pub fn world_names(&self) -> TransportResult<Vec<String>> {
        let header = self.header()?;
        world_entries(world_payload(self.file.as_slice(), &header)?)?
            .map(|entry| entry.map(|entry| entry.name.to_owned()))
            .collect()
    }

    /// Replaces the side-channel data, growing the file if it does not fit.
    pub fn write_side_channel_data(&mut self, data: &[u8]) -> TransportResult<()> {
        self.ensure_turn("write side-channel data")?;
        let header = self.header()?;
        if data.len() > header.side_channel_capacity {
            self.relocate(data.len() * 2 + GROWTH_SLACK, header.world_capacity())?;
        }
        let bytes = self.file.as_mut_slice();
        bytes[HEADER_SIZE..HEADER_SIZE + data.len()].copy_from_slice(data);
        write_i32(bytes, SIDE_CHANNEL_SIZE_OFFSET, wire_len(data.len())?);
        Ok(())
    }

    /// Returns the side-channel data and marks the region empty.
    pub fn read_and_clear_side_channel_data(&mut self) -> TransportResult<Vec<u8>> {
        self.ensure_turn("read side-channel data")?;
        let header = self.header()?;
        let bytes = self.file.as_mut_slice();
        let data = bytes[HEADER_SIZE..HEADER_SIZE + header.side_channel_size].to_vec();
        write_i32(bytes, SIDE_CHANNEL_SIZE_OFFSET, 0);
        Ok(data)
    }

    fn ensure_turn(&self, action: &str) -> TransportResult<()> {
        if self.is_my_turn() {
            Ok(())
        } else {
            Err(TransportError::Protocol(format!(
                "cannot {action} while the peer holds the turn"
            )))
        }
    }

    fn handoff_path(&self) -> PathBuf {
        let mut path = self.file.path().as_os_str().to_owned();
        path.push(&self.config.handoff_suffix);
        PathBuf::from(path)
    }

    /// Moves to `path + suffix` after the peer announced it.
    fn follow_handoff(&mut self) -> TransportResult<()> {
        let next_path = self.handoff_path();
        let next = MappedFile::open(&next_path)?;
        Header::parse(next.as_slice())?;
        let mut previous = std::mem::replace(&mut self.file, next);
        previous.adopt();
        debug!(
            from = %previous.path().display(),
            to = %next_path.display(),
            "following file hand-off"
        );
        drop(previous);
        Ok(())
    }

    /// Copies the live contents into a larger `path + suffix` and retires the
    /// current file with `CHANGE_FILE`.
    fn relocate(&mut self, side_channel_capacity: usize, world_capacity: usize) -> TransportResult<()> {
        let header = self.header()?;
        let next_path = self.handoff_path();
        let total = total_len(side_channel_capacity, world_capacity)?;
        let (world_start, world_len) = world_payload_range(self.file.as_slice(), &header)?;
        let side_len = header.side_channel_size.min(side_channel_capacity);
        let world_len = world_len.min(world_capacity);

        let mut next = MappedFile::create(&next_path, total)?;
        {
            let old = self.file.as_slice();
            let new = next.as_mut_slice();
            write_i32(new, CAPACITY_OFFSET, wire_len(total)?);
            write_i32(new, VERSION_OFFSET, header.version);
            new[COMMAND_OFFSET] = Command::Default as i8 as u8;
            write_i32(
                new,
                SIDE_CHANNEL_CAPACITY_OFFSET,
                wire_len(side_channel_capacity)?,
            );
            write_i32(new, SIDE_CHANNEL_SIZE_OFFSET, wire_len(side_len)?);
            new[HEADER_SIZE..HEADER_SIZE + side_len]
                .copy_from_slice(&old[HEADER_SIZE..HEADER_SIZE + side_len]);
            let new_world = HEADER_SIZE + side_channel_capacity;
            write_i32(new, new_world, wire_len(world_len)?);
            new[new_world + WORLD_SIZE_FIELD..new_world + WORLD_SIZE_FIELD + world_len]
                .copy_from_slice(&old[world_start..world_start + world_len]);
        }
        next.store_ready_flag(self.role.turn_value());

        self.file.as_mut_slice()[COMMAND_OFFSET] = Command::ChangeFile as i8 as u8;
        self.file.disown();
        self.file.store_ready_flag(self.role.peer().turn_value());
        let previous = std::mem::replace(&mut self.file, next);
        debug!(
            from = %previous.path().display(),
            to = %next_path.display(),
            old_capacity = header.capacity,
            new_capacity = total,
            "grew shared memory file"
        );
        drop(previous);
        Ok(())
    }
}

fn total_len(side_channel_capacity: usize, world_capacity: usize) -> TransportResult<usize> {
    let minimum = HEADER_SIZE + WORLD_SIZE_FIELD;
    let total = side_channel_capacity
        .checked_add(world_capacity)
        .and_then(|len| len.checked_add(minimum))
        .filter(|len| i32::try_from(*len).is_ok())
        .ok_or(TransportError::InvalidCapacity {
            requested: side_channel_capacity.saturating_add(world_capacity),
            minimum,
        })?;
    Ok(total)
}
