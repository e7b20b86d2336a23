//! Error surface of the shared-memory transport.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Convenience result alias for fallible transport operations.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

/// Errors surfaced by the mapped file, the handshake and side-channel framing.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Creating, opening, resizing or deleting a mapped file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Requested file size is unusable.
    #[error("mapped capacity {requested} must be between {minimum} and i32::MAX bytes")]
    InvalidCapacity {
        /// Size that was asked for.
        requested: usize,
        /// Smallest valid size.
        minimum: usize,
    },
    /// The peer speaks a different protocol version.
    #[error("protocol version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version this side was configured with.
        expected: i32,
        /// Version read from the file.
        found: i32,
    },
    /// The mapped bytes violate the wire format.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// A side-channel message named a channel nobody registered.
    #[error("no side channel registered for id {channel_id}")]
    UnknownSideChannel {
        /// Id carried by the message.
        channel_id: i32,
    },
    /// Two side channels claimed the same id.
    #[error("side channel id {channel_id} is already registered")]
    DuplicateSideChannel {
        /// Contested id.
        channel_id: i32,
    },
    /// World names are ASCII and at most 63 bytes long.
    #[error("invalid world name {name:?}")]
    InvalidWorldName {
        /// Rejected name.
        name: String,
    },
    /// The peer did not hand the turn back in time.
    #[error("peer did not respond within {waited:?}")]
    TimedOut {
        /// Time spent polling.
        waited: Duration,
    },
}

impl TransportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransportError::Io {
            path: path.into(),
            source,
        }
    }
}
