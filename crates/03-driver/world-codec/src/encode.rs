use crate::layout::{write_f32, write_i32, BlockHeader, BlockLayout};
use crate::CodecResult;
use transport::WorldPayload;
use world::Decisions;

/// This step's decisions, ready to be written as a world block.
///
/// Only the first `agents_this_step` entries of each array are written and
/// the action section is never touched, so actions the peer left there from
/// the previous exchange survive an in-place rewrite.
#[derive(Debug)]
pub struct WorldBlock<'a> {
    decisions: Decisions<'a>,
    header: BlockHeader,
    layout: BlockLayout,
}

impl<'a> WorldBlock<'a> {
    /// Computes the block layout for the decisions of one step.
    pub fn new(decisions: Decisions<'a>) -> CodecResult<Self> {
        let header = BlockHeader::from_spec(decisions.spec());
        let layout = BlockLayout::new(&header)?;
        Ok(Self {
            decisions,
            header,
            layout,
        })
    }

    /// Offsets the block will be written with.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }
}

impl WorldPayload for WorldBlock<'_> {
    fn encoded_len(&self) -> usize {
        self.layout.len
    }

    fn encode_into(&self, out: &mut [u8]) {
        let layout = &self.layout;
        let decisions = &self.decisions;
        self.header.write(out);
        write_i32(out, layout.agents, decisions.len() as i32);

        for (slot, reward) in decisions.rewards().iter().enumerate() {
            write_f32(out, layout.rewards + slot * 4, *reward);
        }
        for (slot, done) in decisions.done().iter().enumerate() {
            out[layout.done + slot] = u8::from(*done);
        }
        for (slot, max_step) in decisions.max_step_reached().iter().enumerate() {
            out[layout.max_step + slot] = u8::from(*max_step);
        }
        for (slot, agent) in decisions.agent_ids().iter().enumerate() {
            write_i32(out, layout.agent_ids + slot * 4, agent.0);
        }
        for (index, (offset, _)) in layout.observations.iter().enumerate() {
            let values = decisions.observation(index).unwrap_or_default();
            for (i, value) in values.iter().enumerate() {
                write_f32(out, offset + i * 4, *value);
            }
        }
        for (i, masked) in decisions.masks().iter().enumerate() {
            out[layout.masks + i] = u8::from(*masked);
        }
    }
}
