//! Shared-memory exchange between a stepped simulation and an external trainer.
//!
//! The pieces, bottom up:
//! * [`Header`] – the fixed 18-byte prefix every mapped file starts with.
//! * [`SharedMemoryChannel`] – one end of the turn-based handshake, with file
//!   growth and hand-off to `path + suffix`.
//! * [`WorldPayload`] / [`world_entries`] – named world blocks; the block
//!   layout itself lives in the world codec.
//! * [`side_channel`] – framed out-of-band messages and the built-in
//!   log and engine-configuration handlers.
//! * [`ChannelSnapshot`] – read-only parsing of a file on disk, for tooling.
//! * [`TransportError`] – error surface for all of the above.

mod channel;
mod config;
mod error;
mod header;
mod region;
pub mod side_channel;
mod snapshot;
pub mod wait;
mod world_section;

pub use channel::{Advance, SharedMemoryChannel};
pub use config::{
    default_memory_path, memory_path_from_args, ChannelConfig, PollConfig, DEFAULT_MEMORY_FILE,
    MEMORY_DIRECTORY, MEMORY_PATH_ARG,
};
pub use error::{TransportError, TransportResult};
pub use header::{
    Command, Header, Role, API_VERSION, CAPACITY_OFFSET, COMMAND_OFFSET, HEADER_SIZE,
    READY_FLAG_OFFSET, SIDE_CHANNEL_CAPACITY_OFFSET, SIDE_CHANNEL_SIZE_OFFSET, VERSION_OFFSET,
    WORLD_SIZE_FIELD,
};
pub use side_channel::{SideChannel, SideChannelRegistry};
pub use snapshot::ChannelSnapshot;
pub use world_section::{
    find_world, validate_world_name, world_entries, WorldEntries, WorldEntry, WorldPayload,
    MAX_WORLD_NAME_LEN, WORLD_NAME_FIELD,
};
