use crate::decode::{decode_actions, ActionSection, WorldBlockReader};
use crate::encode::WorldBlock;
use crate::{CodecError, CodecResult};
use tracing::trace;
use transport::SharedMemoryChannel;
use world::DecisionBuffer;

/// World-level operations on a [`SharedMemoryChannel`].
pub trait WorldChannelExt {
    /// Writes this step's decisions of `buffer` as the block named `name`.
    fn write_world(&mut self, name: &str, buffer: &mut DecisionBuffer) -> CodecResult<()>;

    /// Copies the peer's actions for `name` back into `buffer`.
    fn load_world(&mut self, name: &str, buffer: &mut DecisionBuffer) -> CodecResult<usize>;

    /// Parsed view of the block named `name`.
    fn read_world(&self, name: &str) -> CodecResult<WorldBlockReader<'_>>;

    /// Action writer for the block named `name`; only on this side's turn.
    fn actions_section(&mut self, name: &str) -> CodecResult<ActionSection<'_>>;
}

impl WorldChannelExt for SharedMemoryChannel {
    fn write_world(&mut self, name: &str, buffer: &mut DecisionBuffer) -> CodecResult<()> {
        trace!(world = name, agents = buffer.decisions_requested(), "writing world block");
        let block = WorldBlock::new(buffer.decisions())?;
        self.write_world_payload(name, &block)?;
        Ok(())
    }

    fn load_world(&mut self, name: &str, buffer: &mut DecisionBuffer) -> CodecResult<usize> {
        let block = self.world_block(name)?.ok_or_else(|| unknown(name))?;
        decode_actions(block, buffer)
    }

    fn read_world(&self, name: &str) -> CodecResult<WorldBlockReader<'_>> {
        let block = self.world_block(name)?.ok_or_else(|| unknown(name))?;
        WorldBlockReader::parse(block)
    }

    fn actions_section(&mut self, name: &str) -> CodecResult<ActionSection<'_>> {
        let block = self.world_block_mut(name)?.ok_or_else(|| unknown(name))?;
        ActionSection::new(block)
    }
}

fn unknown(name: &str) -> CodecError {
    CodecError::UnknownWorld {
        name: name.to_owned(),
    }
}
