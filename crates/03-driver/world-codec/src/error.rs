use thiserror::Error;
use transport::TransportError;
use world::WorldError;

/// Convenience result alias for codec operations.
pub type CodecResult<T, E = CodecError> = Result<T, E>;

/// Failures while encoding or decoding a world block.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The channel underneath failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A decoded declaration or action write was rejected by the world.
    #[error(transparent)]
    World(#[from] WorldError),
    /// No block is registered under this name.
    #[error("no world named {name:?} in the channel")]
    UnknownWorld {
        /// Requested name.
        name: String,
    },
    /// The block ends before a field it declares.
    #[error("{what} needs {needed} bytes but the block holds {available}")]
    Truncated {
        /// Field being read.
        what: &'static str,
        /// Bytes required up to the end of the field.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// A field holds a value the format does not allow.
    #[error("malformed world block: {0}")]
    Malformed(String),
    /// The block was written for a different declaration than the buffer's.
    #[error("world block declaration does not match the buffer: {0}")]
    SpecMismatch(String),
}
