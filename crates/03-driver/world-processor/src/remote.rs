use crate::{ProcessError, ProcessResult, WorldCommand, WorldProcessor};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};
use transport::{Command, SharedMemoryChannel};
use world::DecisionBuffer;
use world_codec::WorldChannelExt;

/// One channel shared by every remote world of a process.
pub type SharedChannel = Arc<Mutex<SharedMemoryChannel>>;

/// Asks the trainer on the other end of the channel for actions.
///
/// Each `process` is a full round trip: write the block, hand the turn over,
/// block until it comes back, copy the actions out.
#[derive(Debug)]
pub struct RemoteProcessor {
    channel: SharedChannel,
    world: String,
}

impl RemoteProcessor {
    /// Answers the world named `world` through `channel`.
    pub fn new(channel: SharedChannel, world: impl Into<String>) -> Self {
        Self {
            channel,
            world: world.into(),
        }
    }

    /// Name of the block this processor writes.
    pub fn world(&self) -> &str {
        &self.world
    }
}

impl WorldProcessor for RemoteProcessor {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn process(&mut self, buffer: &mut DecisionBuffer) -> ProcessResult<WorldCommand> {
        let mut channel = self.channel.lock();
        channel.write_world(&self.world, buffer)?;
        channel.hand_over(Command::Default)?;
        let command = channel.wait_for_turn()?;
        trace!(world = %self.world, ?command, "trainer answered");
        match command {
            Command::Default => {
                channel.load_world(&self.world, buffer)?;
                buffer.mark_actions_ready();
                Ok(WorldCommand::Default)
            }
            Command::Reset => {
                debug!(world = %self.world, "trainer requested reset");
                Ok(WorldCommand::Reset)
            }
            Command::Close => {
                debug!(world = %self.world, "trainer closed the session");
                Ok(WorldCommand::Close)
            }
            Command::ChangeFile => Err(ProcessError::UnexpectedCommand(command)),
        }
    }
}
