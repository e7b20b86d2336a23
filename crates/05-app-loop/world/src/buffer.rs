//! Per-world decision storage shared by parallel simulation workers.
//!
//! A step has two phases:
//! * sense: any number of threads call [`DecisionBuffer::request_decision`]
//!   through `&DecisionBuffer`; each call reserves one slot and returns a
//!   [`DecisionHandle`] that writes only that slot.
//! * act: with exclusive access, a processor reads the requested decisions,
//!   fills the action segments and calls [`DecisionBuffer::mark_actions_ready`].
//!   Workers then consume actions with [`DecisionBuffer::for_each_ready_action`].
//!
//! Phase transitions take `&mut self`, so the borrow checker enforces the
//! barrier between them.

use crate::cells::SlotCells;
use crate::counter::DecisionCounter;
use crate::error::{WorldError, WorldResult};
use crate::layout::{TensorLayout, TensorRecord};
use crate::world_spec::{ActionSpace, WorldSpec};
use bytemuck::Pod;
use smallvec::SmallVec;
use std::cell::Cell;
use std::marker::PhantomData;
use std::mem;

/// Stable identity of an agent across steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub i32);

#[derive(Clone, Copy, Debug)]
struct ObservationRegion {
    offset: usize,
    width: usize,
}

#[derive(Debug)]
enum ActionStore {
    Continuous(Vec<f32>),
    Discrete(Vec<i32>),
}

/// Fixed-capacity storage for one policy world.
pub struct DecisionBuffer {
    spec: WorldSpec,
    counter: DecisionCounter,
    regions: SmallVec<[ObservationRegion; 4]>,
    observations: SlotCells<f32>,
    rewards: SlotCells<f32>,
    done: SlotCells<bool>,
    max_step: SlotCells<bool>,
    agent_ids: SlotCells<AgentId>,
    masks: SlotCells<bool>,
    actions: ActionStore,
    action_agents: Vec<AgentId>,
    action_terminated: Vec<bool>,
    actions_ready: usize,
}

impl DecisionBuffer {
    /// Allocates every per-slot array up front; nothing grows afterwards.
    pub fn new(spec: WorldSpec) -> Self {
        let capacity = spec.capacity();
        let mut regions = SmallVec::new();
        let mut offset = 0;
        for shape in spec.observations() {
            let width = shape.element_count();
            regions.push(ObservationRegion { offset, width });
            offset += capacity * width;
        }

        let actions = match spec.actions() {
            ActionSpace::Continuous { size } => ActionStore::Continuous(vec![0.0; capacity * size]),
            ActionSpace::Discrete { branches } => {
                ActionStore::Discrete(vec![0; capacity * branches.len()])
            }
        };

        Self {
            counter: DecisionCounter::new(capacity as u32),
            observations: SlotCells::new(offset),
            rewards: SlotCells::new(capacity),
            done: SlotCells::new(capacity),
            max_step: SlotCells::new(capacity),
            agent_ids: SlotCells::new(capacity),
            masks: SlotCells::new(capacity * spec.actions().mask_width()),
            actions,
            action_agents: vec![AgentId::default(); capacity],
            action_terminated: vec![false; capacity],
            actions_ready: 0,
            regions,
            spec,
        }
    }

    /// Declaration this buffer was built from.
    pub fn spec(&self) -> &WorldSpec {
        &self.spec
    }

    /// Maximum decisions per step.
    pub fn capacity(&self) -> usize {
        self.spec.capacity()
    }

    /// Slots reserved since the decisions counter was last reset.
    pub fn decisions_requested(&self) -> usize {
        self.counter.load() as usize
    }

    /// Number of actions published by the last [`mark_actions_ready`](Self::mark_actions_ready).
    pub fn actions_ready(&self) -> usize {
        self.actions_ready
    }

    /// Reserves a slot for `agent` and returns a writer for it.
    ///
    /// Callable from many threads at once. Fails with
    /// [`WorldError::CapacityExceeded`] once every slot of the step is taken.
    pub fn request_decision(&self, agent: AgentId) -> WorldResult<DecisionHandle<'_>> {
        let slot = self
            .counter
            .try_reserve()
            .ok_or(WorldError::CapacityExceeded {
                capacity: self.capacity(),
            })? as usize;

        let mask_width = self.spec.actions().mask_width();
        // SAFETY: `slot` was reserved just now and is handed to exactly one handle.
        unsafe {
            self.agent_ids.range_mut(slot, 1)[0] = agent;
            self.rewards.range_mut(slot, 1)[0] = 0.0;
            self.done.range_mut(slot, 1)[0] = false;
            self.max_step.range_mut(slot, 1)[0] = false;
            self.masks
                .range_mut(slot * mask_width, mask_width)
                .fill(false);
        }

        Ok(DecisionHandle {
            buffer: self,
            slot,
            _not_sync: PhantomData,
        })
    }

    /// Read-only view of the decisions requested this step.
    pub fn decisions(&mut self) -> Decisions<'_> {
        self.step_views().0
    }

    /// Action segments of the slots requested this step.
    pub fn actions_mut(&mut self) -> ActionsMut<'_> {
        self.step_views().1
    }

    /// Splits the buffer into the decision view and the action writer.
    pub fn step_views(&mut self) -> (Decisions<'_>, ActionsMut<'_>) {
        let len = self.counter.load() as usize;
        let decisions = Decisions {
            len,
            spec: &self.spec,
            regions: &self.regions,
            observations: self.observations.as_slice(),
            rewards: &self.rewards.as_slice()[..len],
            done: &self.done.as_slice()[..len],
            max_step: &self.max_step.as_slice()[..len],
            agent_ids: &self.agent_ids.as_slice()[..len],
            masks: &self.masks.as_slice()[..len * self.spec.actions().mask_width()],
        };
        let actions = ActionsMut {
            len,
            width: self.spec.actions().width(),
            store: &mut self.actions,
        };
        (decisions, actions)
    }

    /// Publishes this step's actions and opens the next sense phase.
    ///
    /// Identities and termination flags are snapshotted so workers can consume
    /// actions while new decisions are being requested.
    pub fn mark_actions_ready(&mut self) {
        let len = self.counter.load() as usize;
        self.action_agents[..len].copy_from_slice(&self.agent_ids.as_slice()[..len]);
        self.action_terminated[..len].copy_from_slice(&self.done.as_slice()[..len]);
        self.actions_ready = len;
        self.counter.reset();
    }

    /// Calls `f` for every published action in slot order, terminated agents included.
    pub fn for_each_ready_action<F>(&self, mut f: F)
    where
        F: FnMut(AgentId, ActionView<'_>),
    {
        for action in self.ready_actions() {
            f(action.agent(), action);
        }
    }

    /// Iterator over the published actions in slot order.
    pub fn ready_actions(&self) -> impl Iterator<Item = ActionView<'_>> + '_ {
        let width = self.spec.actions().width();
        (0..self.actions_ready).map(move |slot| {
            let range = slot * width..(slot + 1) * width;
            ActionView {
                agent: self.action_agents[slot],
                terminated: self.action_terminated[slot],
                actions: match &self.actions {
                    ActionStore::Continuous(values) => ActionSlice::Continuous(&values[range]),
                    ActionStore::Discrete(values) => ActionSlice::Discrete(&values[range]),
                },
            }
        })
    }

    /// Forgets every reserved slot of the current step.
    pub fn reset_decisions_counter(&mut self) {
        self.counter.reset();
    }

    /// Forgets the published actions.
    pub fn reset_actions_counter(&mut self) {
        self.actions_ready = 0;
    }
}

impl std::fmt::Debug for DecisionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionBuffer")
            .field("spec", &self.spec)
            .field("decisions_requested", &self.decisions_requested())
            .field("actions_ready", &self.actions_ready)
            .finish()
    }
}

/// Fluent writer for one reserved slot. Dropping it ends the write.
pub struct DecisionHandle<'a> {
    buffer: &'a DecisionBuffer,
    slot: usize,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a> DecisionHandle<'a> {
    /// Slot index reserved for this decision.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Overwrites the reward of this step.
    pub fn set_reward(self, reward: f32) -> Self {
        // SAFETY: the handle owns its slot for the rest of the sense phase.
        unsafe { self.buffer.rewards.range_mut(self.slot, 1)[0] = reward };
        self
    }

    /// Flags the episode as over; reaching the step limit implies done.
    pub fn has_terminated(self, done: bool, max_step_reached: bool) -> Self {
        // SAFETY: the handle owns its slot for the rest of the sense phase.
        unsafe {
            self.buffer.done.range_mut(self.slot, 1)[0] = done || max_step_reached;
            self.buffer.max_step.range_mut(self.slot, 1)[0] = max_step_reached;
        }
        self
    }

    /// Flattens `record` into observation `index`.
    pub fn set_observation<T: TensorRecord>(self, index: usize, record: &T) -> WorldResult<Self> {
        let layout = TensorLayout::of::<T>()?;
        let segment = self.observation_segment(index, layout.width())?;
        layout.encode_record(record, segment)?;
        Ok(self)
    }

    /// Copies raw values into observation `index`.
    pub fn set_observation_from_slice(self, index: usize, values: &[f32]) -> WorldResult<Self> {
        self.observation_segment(index, values.len())?
            .copy_from_slice(values);
        Ok(self)
    }

    /// Forbids choice `action` of discrete `branch` for this step.
    pub fn set_discrete_action_mask(self, branch: usize, action: usize) -> WorldResult<Self> {
        let ActionSpace::Discrete { branches } = self.buffer.spec.actions() else {
            return Err(WorldError::NotDiscrete);
        };
        if branches.get(branch).map_or(true, |cardinality| action >= *cardinality) {
            return Err(WorldError::MaskOutOfRange { branch, action });
        }
        let mask_width = self.buffer.spec.actions().mask_width();
        let offset = self.slot * mask_width + branches[..branch].iter().sum::<usize>() + action;
        // SAFETY: the offset lies inside this slot's mask row.
        unsafe { self.buffer.masks.range_mut(offset, 1)[0] = true };
        Ok(self)
    }

    #[allow(clippy::mut_from_ref)]
    fn observation_segment(&self, index: usize, len: usize) -> WorldResult<&mut [f32]> {
        let region = *self
            .buffer
            .regions
            .get(index)
            .ok_or(WorldError::UnknownObservation {
                index,
                count: self.buffer.regions.len(),
            })?;
        if len != region.width {
            return Err(WorldError::ObservationSizeMismatch {
                index,
                expected: region.width,
                actual: len,
            });
        }
        // SAFETY: the segment belongs to this handle's slot; the borrow ends
        // before the handle is used again.
        Ok(unsafe {
            self.buffer
                .observations
                .range_mut(region.offset + self.slot * region.width, region.width)
        })
    }
}

/// Decisions requested during the current step.
#[derive(Clone, Copy, Debug)]
pub struct Decisions<'a> {
    len: usize,
    spec: &'a WorldSpec,
    regions: &'a [ObservationRegion],
    observations: &'a [f32],
    rewards: &'a [f32],
    done: &'a [bool],
    max_step: &'a [bool],
    agent_ids: &'a [AgentId],
    masks: &'a [bool],
}

impl<'a> Decisions<'a> {
    /// Number of requested slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no agent requested a decision.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Declaration of the owning world.
    pub fn spec(&self) -> &'a WorldSpec {
        self.spec
    }

    /// Rewards indexed by slot.
    pub fn rewards(&self) -> &'a [f32] {
        self.rewards
    }

    /// Done flags indexed by slot.
    pub fn done(&self) -> &'a [bool] {
        self.done
    }

    /// Max-step flags indexed by slot.
    pub fn max_step_reached(&self) -> &'a [bool] {
        self.max_step
    }

    /// Agent identities indexed by slot.
    pub fn agent_ids(&self) -> &'a [AgentId] {
        self.agent_ids
    }

    /// Observation `index` for every requested slot, slot-major.
    pub fn observation(&self, index: usize) -> Option<&'a [f32]> {
        let region = self.regions.get(index)?;
        Some(&self.observations[region.offset..region.offset + self.len * region.width])
    }

    /// Observation `index` of a single slot.
    pub fn observation_of(&self, index: usize, slot: usize) -> Option<&'a [f32]> {
        let region = self.regions.get(index)?;
        if slot >= self.len {
            return None;
        }
        let start = region.offset + slot * region.width;
        Some(&self.observations[start..start + region.width])
    }

    /// Action masks, `mask_width` entries per slot; `true` forbids the choice.
    pub fn masks(&self) -> &'a [bool] {
        self.masks
    }

    /// The decision in `slot`, if it was requested this step.
    pub fn get(&self, slot: usize) -> Option<DecisionRef<'a>> {
        (slot < self.len).then_some(DecisionRef {
            decisions: *self,
            slot,
        })
    }

    /// Requested decisions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = DecisionRef<'a>> + 'a {
        let decisions = *self;
        (0..self.len).map(move |slot| DecisionRef { decisions, slot })
    }
}

/// One requested decision, borrowed from [`Decisions`].
#[derive(Clone, Copy, Debug)]
pub struct DecisionRef<'a> {
    decisions: Decisions<'a>,
    slot: usize,
}

impl<'a> DecisionRef<'a> {
    /// Slot the decision occupies.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Agent that asked.
    pub fn agent(&self) -> AgentId {
        self.decisions.agent_ids[self.slot]
    }

    /// Reward reported with the request.
    pub fn reward(&self) -> f32 {
        self.decisions.rewards[self.slot]
    }

    /// Episode ended for this agent.
    pub fn done(&self) -> bool {
        self.decisions.done[self.slot]
    }

    /// Episode ended by reaching the step limit.
    pub fn max_step_reached(&self) -> bool {
        self.decisions.max_step[self.slot]
    }

    /// Observation `index` of this agent.
    pub fn observation(&self, index: usize) -> Option<&'a [f32]> {
        self.decisions.observation_of(index, self.slot)
    }

    /// Mask row of this agent; empty for continuous worlds.
    pub fn mask(&self) -> &'a [bool] {
        let width = self.decisions.spec.actions().mask_width();
        &self.decisions.masks[self.slot * width..(self.slot + 1) * width]
    }
}

/// Mutable action segments of the requested slots.
#[derive(Debug)]
pub struct ActionsMut<'a> {
    len: usize,
    width: usize,
    store: &'a mut ActionStore,
}

impl ActionsMut<'_> {
    /// Number of requested slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Action elements per slot.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Continuous actions, slot-major; `None` for discrete worlds.
    pub fn continuous(&mut self) -> Option<&mut [f32]> {
        match self.store {
            ActionStore::Continuous(values) => Some(&mut values[..self.len * self.width]),
            ActionStore::Discrete(_) => None,
        }
    }

    /// Discrete actions, slot-major; `None` for continuous worlds.
    pub fn discrete(&mut self) -> Option<&mut [i32]> {
        match self.store {
            ActionStore::Discrete(values) => Some(&mut values[..self.len * self.width]),
            ActionStore::Continuous(_) => None,
        }
    }

    /// Zeroes every requested action segment.
    pub fn clear(&mut self) {
        let end = self.len * self.width;
        match self.store {
            ActionStore::Continuous(values) => values[..end].fill(0.0),
            ActionStore::Discrete(values) => values[..end].fill(0),
        }
    }

    /// Writes `record` as the action segment of `slot`.
    pub fn write_record<A: Pod>(&mut self, slot: usize, record: &A) -> WorldResult<()> {
        let expected = self.width * mem::size_of::<f32>();
        if mem::size_of::<A>() != expected {
            return Err(WorldError::ActionSizeMismatch {
                expected,
                actual: mem::size_of::<A>(),
            });
        }
        if slot >= self.len {
            return Err(WorldError::SlotNotRequested {
                slot,
                requested: self.len,
            });
        }

        let bytes = bytemuck::bytes_of(record).chunks_exact(4);
        let range = slot * self.width..(slot + 1) * self.width;
        match self.store {
            ActionStore::Continuous(values) => {
                for (value, chunk) in values[range].iter_mut().zip(bytes) {
                    *value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            ActionStore::Discrete(values) => {
                for (value, chunk) in values[range].iter_mut().zip(bytes) {
                    *value = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
        }
        Ok(())
    }
}

/// Borrowed action segment of one slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionSlice<'a> {
    /// Continuous values.
    Continuous(&'a [f32]),
    /// One choice per discrete branch.
    Discrete(&'a [i32]),
}

/// A published action together with the agent it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionView<'a> {
    agent: AgentId,
    terminated: bool,
    actions: ActionSlice<'a>,
}

impl<'a> ActionView<'a> {
    /// Agent the action was decided for.
    pub fn agent(&self) -> AgentId {
        self.agent
    }

    /// True when the agent reported done in the step that produced this action.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Raw action segment.
    pub fn actions(&self) -> ActionSlice<'a> {
        self.actions
    }

    /// Continuous values, if the world is continuous.
    pub fn continuous(&self) -> Option<&'a [f32]> {
        match self.actions {
            ActionSlice::Continuous(values) => Some(values),
            ActionSlice::Discrete(_) => None,
        }
    }

    /// Branch choices, if the world is discrete.
    pub fn discrete(&self) -> Option<&'a [i32]> {
        match self.actions {
            ActionSlice::Discrete(values) => Some(values),
            ActionSlice::Continuous(_) => None,
        }
    }

    /// Reinterprets the segment as `A`, which must be exactly one segment wide.
    pub fn read<A: Pod>(&self) -> WorldResult<A> {
        let bytes: &[u8] = match self.actions {
            ActionSlice::Continuous(values) => bytemuck::cast_slice(values),
            ActionSlice::Discrete(values) => bytemuck::cast_slice(values),
        };
        if bytes.len() != mem::size_of::<A>() {
            return Err(WorldError::ActionSizeMismatch {
                expected: bytes.len(),
                actual: mem::size_of::<A>(),
            });
        }
        Ok(bytemuck::pod_read_unaligned(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_spec::ObservationShape;

    fn continuous_buffer(capacity: usize) -> DecisionBuffer {
        DecisionBuffer::new(
            WorldSpec::builder(capacity)
                .observation(ObservationShape::vector(2))
                .observation(ObservationShape::new(2, 2, 0))
                .continuous_actions(2)
                .build()
                .expect("spec"),
        )
    }

    #[test]
    fn handle_writes_only_its_slot() {
        let mut buffer = continuous_buffer(3);
        buffer
            .request_decision(AgentId(7))
            .expect("slot")
            .set_reward(1.0)
            .set_observation_from_slice(0, &[1.0, 2.0])
            .expect("obs");
        buffer
            .request_decision(AgentId(8))
            .expect("slot")
            .set_reward(2.0)
            .set_observation_from_slice(1, &[5.0, 6.0, 7.0, 8.0])
            .expect("obs");

        let decisions = buffer.decisions();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions.agent_ids(), &[AgentId(7), AgentId(8)]);
        assert_eq!(decisions.rewards(), &[1.0, 2.0]);
        assert_eq!(decisions.observation_of(0, 0), Some(&[1.0, 2.0][..]));
        assert_eq!(decisions.observation_of(1, 1), Some(&[5.0, 6.0, 7.0, 8.0][..]));
        assert_eq!(decisions.observation_of(1, 2), None);

        let second = decisions.get(1).expect("requested");
        assert_eq!(second.agent(), AgentId(8));
        assert_eq!(second.reward(), 2.0);
        assert_eq!(second.observation(1), Some(&[5.0, 6.0, 7.0, 8.0][..]));
        assert!(decisions.get(2).is_none());
        assert_eq!(
            decisions.iter().map(|decision| decision.slot()).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn observation_errors_leave_slot_reserved() {
        let buffer = continuous_buffer(2);
        let handle = buffer.request_decision(AgentId(1)).expect("slot");
        assert!(matches!(
            handle.set_observation_from_slice(0, &[1.0]),
            Err(WorldError::ObservationSizeMismatch {
                index: 0,
                expected: 2,
                actual: 1
            })
        ));
        let handle = buffer.request_decision(AgentId(2)).expect("slot");
        assert!(matches!(
            handle.set_observation_from_slice(5, &[]),
            Err(WorldError::UnknownObservation { index: 5, count: 2 })
        ));
        assert_eq!(buffer.decisions_requested(), 2);
    }

    #[test]
    fn max_step_implies_done() {
        let mut buffer = continuous_buffer(1);
        buffer
            .request_decision(AgentId(3))
            .expect("slot")
            .has_terminated(false, true);
        let decisions = buffer.decisions();
        assert_eq!(decisions.done(), &[true]);
        assert_eq!(decisions.max_step_reached(), &[true]);
    }

    #[test]
    fn masks_only_apply_to_discrete_worlds() {
        let buffer = continuous_buffer(1);
        let handle = buffer.request_decision(AgentId(0)).expect("slot");
        assert!(matches!(
            handle.set_discrete_action_mask(0, 0),
            Err(WorldError::NotDiscrete)
        ));

        let mut discrete = DecisionBuffer::new(
            WorldSpec::builder(2)
                .discrete_actions(&[2, 3])
                .build()
                .expect("spec"),
        );
        discrete.request_decision(AgentId(0)).expect("slot");
        discrete
            .request_decision(AgentId(1))
            .expect("slot")
            .set_discrete_action_mask(1, 2)
            .expect("mask")
            .set_discrete_action_mask(0, 0)
            .expect("mask");
        assert!(matches!(
            discrete
                .request_decision(AgentId(2))
                .map(|handle| handle.slot()),
            Err(WorldError::CapacityExceeded { capacity: 2 })
        ));

        let decisions = discrete.decisions();
        assert_eq!(
            decisions.masks(),
            &[false, false, false, false, false, true, false, false, false, true]
        );
        assert_eq!(
            decisions.get(1).expect("slot").mask(),
            &[true, false, false, false, true]
        );
    }

    #[test]
    fn actions_are_published_with_their_agents() {
        let mut buffer = continuous_buffer(4);
        buffer.request_decision(AgentId(10)).expect("slot");
        buffer
            .request_decision(AgentId(11))
            .expect("slot")
            .has_terminated(true, false);

        buffer
            .actions_mut()
            .continuous()
            .expect("continuous")
            .copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        buffer.mark_actions_ready();

        assert_eq!(buffer.decisions_requested(), 0);
        let mut seen = Vec::new();
        buffer.for_each_ready_action(|agent, action| {
            seen.push((agent, action.is_terminated(), action.read::<[f32; 2]>().expect("read")));
        });
        assert_eq!(
            seen,
            vec![
                (AgentId(10), false, [1.0, 2.0]),
                (AgentId(11), true, [3.0, 4.0]),
            ]
        );

        // The next sense phase does not disturb published actions.
        buffer.request_decision(AgentId(99)).expect("slot");
        assert_eq!(buffer.ready_actions().count(), 2);

        buffer.reset_actions_counter();
        assert_eq!(buffer.ready_actions().count(), 0);
    }

    #[test]
    fn write_record_checks_segment_size() {
        let mut buffer = DecisionBuffer::new(
            WorldSpec::builder(2)
                .discrete_actions(&[4, 4])
                .build()
                .expect("spec"),
        );
        buffer.request_decision(AgentId(0)).expect("slot");
        let mut actions = buffer.actions_mut();
        actions.write_record(0, &[3i32, 1]).expect("write");
        assert!(matches!(
            actions.write_record(0, &5i32),
            Err(WorldError::ActionSizeMismatch {
                expected: 8,
                actual: 4
            })
        ));
        assert_eq!(actions.discrete(), Some(&mut [3, 1][..]));
    }

    #[test]
    fn requesting_again_resets_stale_slot_state() {
        let mut buffer = continuous_buffer(1);
        buffer
            .request_decision(AgentId(1))
            .expect("slot")
            .set_reward(5.0)
            .has_terminated(true, true);
        buffer.reset_decisions_counter();
        buffer.request_decision(AgentId(2)).expect("slot");
        let decisions = buffer.decisions();
        assert_eq!(decisions.rewards(), &[0.0]);
        assert_eq!(decisions.done(), &[false]);
        assert_eq!(decisions.max_step_reached(), &[false]);
    }
}
