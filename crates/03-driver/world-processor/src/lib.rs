//! Action sources for decision buffers and the loop that drives them.
//!
//! * [`WorldProcessor`] – fills every requested slot's actions once per step.
//! * [`NullProcessor`], [`HeuristicProcessor`], [`InferenceProcessor`] – local
//!   sources; [`RemoteProcessor`] – a round trip through the shared-memory
//!   channel.
//! * [`Academy`] – owns the worlds, exchanges side-channel data with the
//!   trainer and applies its reset and close commands.

mod academy;
mod error;
mod heuristic;
mod inference;
mod processor;
mod remote;

pub use academy::{Academy, AcademyBuilder, StepOutcome, WorldId};
pub use error::{ProcessError, ProcessResult};
pub use heuristic::HeuristicProcessor;
pub use inference::{InferenceProcessor, PolicyModel};
pub use processor::{NullProcessor, WorldCommand, WorldProcessor};
pub use remote::{RemoteProcessor, SharedChannel};
