//! Block header and the offsets it implies.
//!
//! ```text
//! i32  capacity
//! u8   is_continuous
//! i32  action_size            continuous width, or branch count
//! i32  cardinality[branches]  discrete only
//! i32  observation_count
//! i32  x, y, z                per observation shape
//! i32  agents_this_step
//! f32  reward[capacity]
//! u8   done[capacity]
//! u8   max_step_reached[capacity]
//! i32  agent_id[capacity]
//! f32  observation[capacity * element_count]   per shape
//! u8   mask[capacity * sum(cardinalities)]     discrete only
//! f32  action[capacity * width]                continuous
//! i32  action[capacity * branches]             discrete
//! ```
//!
//! Every field is little-endian and packed; nothing is aligned.

use crate::{CodecError, CodecResult};
use smallvec::SmallVec;
use world::{ActionSpace, ObservationShape, WorldSpec};

/// Declaration carried at the start of every block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Slots reserved per step.
    pub capacity: usize,
    /// Action space of the world.
    pub actions: ActionSpace,
    /// Observation shapes in index order.
    pub observations: SmallVec<[ObservationShape; 4]>,
}

impl BlockHeader {
    /// Header describing `spec`.
    pub fn from_spec(spec: &WorldSpec) -> Self {
        Self {
            capacity: spec.capacity(),
            actions: spec.actions().clone(),
            observations: SmallVec::from_slice(spec.observations()),
        }
    }

    /// Bytes the header occupies, excluding `agents_this_step`.
    pub fn encoded_len(&self) -> usize {
        4 + 1 + 4 + 4 * self.actions.branches().len() + 4 + 12 * self.observations.len()
    }

    /// Writes the header at the start of `out`.
    pub(crate) fn write(&self, out: &mut [u8]) {
        let mut cursor = 0;
        put_i32(out, &mut cursor, self.capacity as i32);
        out[cursor] = u8::from(self.actions.is_continuous());
        cursor += 1;
        put_i32(out, &mut cursor, self.actions.width() as i32);
        for cardinality in self.actions.branches() {
            put_i32(out, &mut cursor, *cardinality as i32);
        }
        put_i32(out, &mut cursor, self.observations.len() as i32);
        for shape in &self.observations {
            for dim in shape.dims() {
                put_i32(out, &mut cursor, dim as i32);
            }
        }
    }

    /// Parses the header at the start of `block`.
    pub fn parse(block: &[u8]) -> CodecResult<Self> {
        let mut reader = FieldReader { block, cursor: 0 };
        let capacity = reader.count("capacity")?;
        if capacity == 0 {
            return Err(CodecError::Malformed("capacity is zero".to_owned()));
        }
        let is_continuous = match reader.u8("action kind")? {
            0 => false,
            1 => true,
            other => {
                return Err(CodecError::Malformed(format!(
                    "action kind byte {other} is neither 0 nor 1"
                )))
            }
        };
        let action_size = reader.count("action size")?;
        let actions = if is_continuous {
            ActionSpace::Continuous { size: action_size }
        } else {
            reader.ensure_fits(action_size, 4, "branch cardinalities")?;
            let mut branches = SmallVec::with_capacity(action_size);
            for _ in 0..action_size {
                branches.push(reader.count("branch cardinality")?);
            }
            ActionSpace::Discrete { branches }
        };
        let observation_count = reader.count("observation count")?;
        reader.ensure_fits(observation_count, 12, "observation shapes")?;
        let mut observations = SmallVec::with_capacity(observation_count);
        for _ in 0..observation_count {
            let x = reader.dim("observation x")?;
            let y = reader.dim("observation y")?;
            let z = reader.dim("observation z")?;
            observations.push(ObservationShape::new(x, y, z));
        }
        Ok(Self {
            capacity,
            actions,
            observations,
        })
    }

    /// Rebuilds the world declaration; fails when the header describes an invalid world.
    pub fn to_spec(&self) -> CodecResult<WorldSpec> {
        let mut builder = WorldSpec::builder(self.capacity);
        for shape in &self.observations {
            builder = builder.observation(*shape);
        }
        builder = match &self.actions {
            ActionSpace::Continuous { size } => builder.continuous_actions(*size),
            ActionSpace::Discrete { branches } => builder.discrete_actions(branches),
        };
        Ok(builder.build()?)
    }
}

/// Byte offsets of every section of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockLayout {
    /// Slots reserved per step.
    pub capacity: usize,
    /// Offset of `agents_this_step`.
    pub agents: usize,
    /// Offset of the reward array.
    pub rewards: usize,
    /// Offset of the done flags.
    pub done: usize,
    /// Offset of the max-step flags.
    pub max_step: usize,
    /// Offset of the agent ids.
    pub agent_ids: usize,
    /// `(offset, values per slot)` of every observation array.
    pub observations: SmallVec<[(usize, usize); 4]>,
    /// Offset of the mask array.
    pub masks: usize,
    /// Mask entries per slot.
    pub mask_width: usize,
    /// Offset of the action array.
    pub actions: usize,
    /// Action elements per slot.
    pub action_width: usize,
    /// Whether actions are `f32` (otherwise `i32`).
    pub continuous: bool,
    /// Total block length.
    pub len: usize,
}

impl BlockLayout {
    /// Computes the offsets for `header`, rejecting sizes that overflow.
    pub fn new(header: &BlockHeader) -> CodecResult<Self> {
        let capacity = header.capacity;
        let overflow = || CodecError::Malformed("block size overflows".to_owned());
        let per_slot = |bytes: usize| capacity.checked_mul(bytes).ok_or_else(overflow);

        let agents = header.encoded_len();
        let rewards = agents + 4;
        let done = rewards.checked_add(per_slot(4)?).ok_or_else(overflow)?;
        let max_step = done.checked_add(capacity).ok_or_else(overflow)?;
        let agent_ids = max_step.checked_add(capacity).ok_or_else(overflow)?;
        let mut cursor = agent_ids.checked_add(per_slot(4)?).ok_or_else(overflow)?;

        let mut observations = SmallVec::with_capacity(header.observations.len());
        for shape in &header.observations {
            let width = shape.checked_element_count().ok_or_else(overflow)?;
            observations.push((cursor, width));
            let bytes = width.checked_mul(4).ok_or_else(overflow)?;
            cursor = cursor.checked_add(per_slot(bytes)?).ok_or_else(overflow)?;
        }

        let masks = cursor;
        let mask_width = header.actions.mask_width();
        let actions = masks.checked_add(per_slot(mask_width)?).ok_or_else(overflow)?;
        let action_width = header.actions.width();
        let action_bytes = action_width.checked_mul(4).ok_or_else(overflow)?;
        let len = actions.checked_add(per_slot(action_bytes)?).ok_or_else(overflow)?;

        Ok(Self {
            capacity,
            agents,
            rewards,
            done,
            max_step,
            agent_ids,
            observations,
            masks,
            mask_width,
            actions,
            action_width,
            continuous: header.actions.is_continuous(),
            len,
        })
    }

    /// Byte range of the action segment of `slot`.
    pub fn action_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = self.actions + slot * self.action_width * 4;
        start..start + self.action_width * 4
    }
}

struct FieldReader<'a> {
    block: &'a [u8],
    cursor: usize,
}

impl FieldReader<'_> {
    fn take<const N: usize>(&mut self, what: &'static str) -> CodecResult<[u8; N]> {
        let end = self.cursor + N;
        let bytes = self.block.get(self.cursor..end).ok_or(CodecError::Truncated {
            what,
            needed: end,
            available: self.block.len(),
        })?;
        self.cursor = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self, what: &'static str) -> CodecResult<u8> {
        self.take::<1>(what).map(|[byte]| byte)
    }

    fn count(&mut self, what: &'static str) -> CodecResult<usize> {
        let value = i32::from_le_bytes(self.take::<4>(what)?);
        usize::try_from(value).map_err(|_| CodecError::Malformed(format!("negative {what} {value}")))
    }

    fn dim(&mut self, what: &'static str) -> CodecResult<u32> {
        let value = self.count(what)?;
        u32::try_from(value).map_err(|_| CodecError::Malformed(format!("{what} {value} out of range")))
    }

    /// Rejects counts that cannot fit in the rest of the block before allocating for them.
    fn ensure_fits(&self, count: usize, each: usize, what: &'static str) -> CodecResult<()> {
        let needed = count
            .checked_mul(each)
            .and_then(|bytes| bytes.checked_add(self.cursor))
            .unwrap_or(usize::MAX);
        if needed > self.block.len() {
            return Err(CodecError::Truncated {
                what,
                needed,
                available: self.block.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn put_i32(out: &mut [u8], cursor: &mut usize, value: i32) {
    out[*cursor..*cursor + 4].copy_from_slice(&value.to_le_bytes());
    *cursor += 4;
}

pub(crate) fn write_i32(out: &mut [u8], offset: usize, value: i32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_f32(out: &mut [u8], offset: usize, value: f32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_i32(block: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        block[offset],
        block[offset + 1],
        block[offset + 2],
        block[offset + 3],
    ])
}

pub(crate) fn read_f32(block: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_i32(block, offset) as u32)
}
