//! Encoding of a [`world::DecisionBuffer`] into the world blocks carried by
//! the shared-memory channel, and decoding of the actions written back.
//!
//! The simulation writes one block per world with [`WorldChannelExt::write_world`]
//! and copies the actions back with [`WorldChannelExt::load_world`]. The
//! trainer side reads blocks with [`WorldBlockReader`] and answers through
//! [`ActionSection`].

mod channel_ext;
mod decode;
mod encode;
mod error;
mod layout;

pub use channel_ext::WorldChannelExt;
pub use decode::{decode_actions, ActionSection, DecodedDecision, WorldBlockReader};
pub use encode::WorldBlock;
pub use error::{CodecError, CodecResult};
pub use layout::{BlockHeader, BlockLayout};
