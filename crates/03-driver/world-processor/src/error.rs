use crate::WorldId;
use thiserror::Error;
use transport::{Command, TransportError};
use world::WorldError;
use world_codec::CodecError;

/// Convenience result alias for processors and the academy.
pub type ProcessResult<T, E = ProcessError> = Result<T, E>;

/// Failures while deciding actions or driving the step loop.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Channel failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Decision buffer failure.
    #[error(transparent)]
    World(#[from] WorldError),
    /// World block failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A processor does not fit the world it was attached to.
    #[error("invalid processor configuration: {0}")]
    InvalidConfig(String),
    /// The policy model reported a failure.
    #[error("policy model failed: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Two worlds were subscribed under one name.
    #[error("a world named {name:?} is already subscribed")]
    DuplicateWorld {
        /// Contested name.
        name: String,
    },
    /// The id was not issued by this academy.
    #[error("no world with id {0:?}")]
    UnknownWorld(WorldId),
    /// The trainer closed the session.
    #[error("the trainer closed the session")]
    Closed,
    /// The peer left a command that makes no sense at this point.
    #[error("unexpected command {0:?} from the peer")]
    UnexpectedCommand(Command),
}
