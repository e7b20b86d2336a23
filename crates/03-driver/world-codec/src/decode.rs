//! Reading blocks back: the full view used by the trainer side and tooling,
//! the action writer used by the trainer, and the action copy-back used by
//! the simulation.

use crate::layout::{read_f32, read_i32, write_f32, write_i32, BlockHeader, BlockLayout};
use crate::{CodecError, CodecResult};
use world::{AgentId, DecisionBuffer};

/// Parsed view over a world block.
#[derive(Debug, Clone)]
pub struct WorldBlockReader<'a> {
    block: &'a [u8],
    header: BlockHeader,
    layout: BlockLayout,
    agents: usize,
}

/// Everything one agent reported, copied out of a block.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedDecision {
    /// Agent that requested the decision.
    pub agent: AgentId,
    /// Reward since the previous decision.
    pub reward: f32,
    /// The episode ended for this agent.
    pub done: bool,
    /// The episode ended by hitting its step limit.
    pub max_step_reached: bool,
    /// One vector per observation shape.
    pub observations: Vec<Vec<f32>>,
    /// Mask row; empty for continuous worlds.
    pub mask: Vec<bool>,
}

impl<'a> WorldBlockReader<'a> {
    /// Validates the header and every size the header implies.
    pub fn parse(block: &'a [u8]) -> CodecResult<Self> {
        let header = BlockHeader::parse(block)?;
        let layout = BlockLayout::new(&header)?;
        if block.len() < layout.len {
            return Err(CodecError::Truncated {
                what: "world block",
                needed: layout.len,
                available: block.len(),
            });
        }
        let agents = read_i32(block, layout.agents);
        let agents = usize::try_from(agents)
            .ok()
            .filter(|agents| *agents <= header.capacity)
            .ok_or_else(|| {
                CodecError::Malformed(format!(
                    "agents_this_step {agents} outside 0..={}",
                    header.capacity
                ))
            })?;
        Ok(Self {
            block,
            header,
            layout,
            agents,
        })
    }

    /// Declaration at the start of the block.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Offsets implied by the header.
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Decisions written this step.
    pub fn agents_this_step(&self) -> usize {
        self.agents
    }

    /// Copies out the decision in `slot`; `None` past `agents_this_step`.
    pub fn decision(&self, slot: usize) -> Option<DecodedDecision> {
        if slot >= self.agents {
            return None;
        }
        let layout = &self.layout;
        let observations = layout
            .observations
            .iter()
            .map(|(offset, width)| {
                let start = offset + slot * width * 4;
                (0..*width)
                    .map(|i| read_f32(self.block, start + i * 4))
                    .collect()
            })
            .collect();
        let mask_start = layout.masks + slot * layout.mask_width;
        Some(DecodedDecision {
            agent: AgentId(read_i32(self.block, layout.agent_ids + slot * 4)),
            reward: read_f32(self.block, layout.rewards + slot * 4),
            done: self.block[layout.done + slot] != 0,
            max_step_reached: self.block[layout.max_step + slot] != 0,
            observations,
            mask: self.block[mask_start..mask_start + layout.mask_width]
                .iter()
                .map(|byte| *byte != 0)
                .collect(),
        })
    }

    /// All decisions written this step, in slot order.
    pub fn decisions(&self) -> impl Iterator<Item = DecodedDecision> + '_ {
        (0..self.agents).filter_map(|slot| self.decision(slot))
    }

    /// Continuous action values of `slot`, as currently stored.
    pub fn continuous_actions(&self, slot: usize) -> Option<Vec<f32>> {
        (self.layout.continuous && slot < self.header.capacity).then(|| {
            self.layout
                .action_range(slot)
                .step_by(4)
                .map(|offset| read_f32(self.block, offset))
                .collect()
        })
    }

    /// Discrete branch choices of `slot`, as currently stored.
    pub fn discrete_actions(&self, slot: usize) -> Option<Vec<i32>> {
        (!self.layout.continuous && slot < self.header.capacity).then(|| {
            self.layout
                .action_range(slot)
                .step_by(4)
                .map(|offset| read_i32(self.block, offset))
                .collect()
        })
    }
}

/// Writer for the action section of a block, used by the side that decides.
#[derive(Debug)]
pub struct ActionSection<'a> {
    block: &'a mut [u8],
    layout: BlockLayout,
}

impl<'a> ActionSection<'a> {
    /// Validates the block header before any action is written.
    pub fn new(block: &'a mut [u8]) -> CodecResult<Self> {
        let layout = WorldBlockReader::parse(block)?.layout;
        Ok(Self { block, layout })
    }

    /// Action elements per slot.
    pub fn width(&self) -> usize {
        self.layout.action_width
    }

    /// Stores continuous actions for `slot`.
    pub fn write_continuous(&mut self, slot: usize, values: &[f32]) -> CodecResult<()> {
        self.check(slot, values.len(), true)?;
        let start = self.layout.action_range(slot).start;
        for (i, value) in values.iter().enumerate() {
            write_f32(self.block, start + i * 4, *value);
        }
        Ok(())
    }

    /// Stores discrete branch choices for `slot`.
    pub fn write_discrete(&mut self, slot: usize, choices: &[i32]) -> CodecResult<()> {
        self.check(slot, choices.len(), false)?;
        let start = self.layout.action_range(slot).start;
        for (i, choice) in choices.iter().enumerate() {
            write_i32(self.block, start + i * 4, *choice);
        }
        Ok(())
    }

    fn check(&self, slot: usize, len: usize, continuous: bool) -> CodecResult<()> {
        if self.layout.continuous != continuous {
            return Err(CodecError::SpecMismatch(format!(
                "block stores {} actions",
                if self.layout.continuous { "continuous" } else { "discrete" }
            )));
        }
        if slot >= self.layout.capacity || len != self.layout.action_width {
            return Err(CodecError::Malformed(format!(
                "action write of {len} values to slot {slot}, block holds {} slots of width {}",
                self.layout.capacity, self.layout.action_width
            )));
        }
        Ok(())
    }
}

/// Copies the actions stored in `block` into `buffer` for the slots requested this step.
///
/// The block must have been written from a buffer with the same declaration
/// and the same number of requested decisions. Returns that number.
pub fn decode_actions(block: &[u8], buffer: &mut DecisionBuffer) -> CodecResult<usize> {
    let reader = WorldBlockReader::parse(block)?;
    let expected = BlockHeader::from_spec(buffer.spec());
    if reader.header != expected {
        return Err(CodecError::SpecMismatch(format!(
            "block declares {:?}, buffer declares {:?}",
            reader.header, expected
        )));
    }
    let requested = buffer.decisions_requested();
    if reader.agents != requested {
        return Err(CodecError::Malformed(format!(
            "block carries {} decisions, buffer requested {requested}",
            reader.agents
        )));
    }

    let start = reader.layout.actions;
    let mut actions = buffer.actions_mut();
    if reader.layout.continuous {
        if let Some(values) = actions.continuous() {
            for (i, value) in values.iter_mut().enumerate() {
                *value = read_f32(block, start + i * 4);
            }
        }
    } else if let Some(values) = actions.discrete() {
        for (i, value) in values.iter_mut().enumerate() {
            *value = read_i32(block, start + i * 4);
        }
    }
    Ok(requested)
}
