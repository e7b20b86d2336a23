//! The step loop that owns every world and its processor.
//!
//! Worlds are registered once, by name. Each step the host fills the buffers,
//! then calls [`Academy::step`] (or [`Academy::update_world`] per world). For
//! remote worlds the academy also carries the side-channel traffic: queued
//! outgoing messages ride along with the world data, and whatever the trainer
//! left in the region is dispatched once the turn comes back.

use crate::{
    NullProcessor, ProcessError, ProcessResult, RemoteProcessor, SharedChannel, WorldCommand,
    WorldProcessor,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, trace};
use transport::side_channel::{
    EngineConfigurationChannel, EngineConfigurationHandle, ENGINE_CONFIGURATION_CHANNEL_ID,
};
use transport::{
    memory_path_from_args, validate_world_name, ChannelConfig, Command, Role, SharedMemoryChannel,
    SideChannel, SideChannelRegistry,
};
use world::DecisionBuffer;

/// Handle for a world subscribed to an [`Academy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(usize);

impl WorldId {
    /// Registration order, starting at zero.
    pub fn index(self) -> usize {
        self.0
    }
}

/// What one update did. Later variants win when a step covers several worlds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepOutcome {
    /// No decision was requested.
    Idle,
    /// Actions are ready.
    Stepped,
    /// The trainer asked for a reset; every world was cleared.
    Reset,
    /// The trainer ended the session.
    Closed,
}

struct WorldSlot {
    name: String,
    buffer: DecisionBuffer,
    processor: Box<dyn WorldProcessor>,
}

/// Owns the subscribed worlds and steps them against their processors.
///
/// Remote worlds share one channel to the trainer; the first remote update
/// performs the handshake and exchanges side-channel data.
pub struct Academy {
    channel: Option<SharedChannel>,
    side_channels: SideChannelRegistry,
    outgoing: Vec<u8>,
    worlds: Vec<WorldSlot>,
    handshake_done: bool,
    closed: bool,
    engine_configuration: Option<EngineConfigurationHandle>,
}

impl Academy {
    /// Starts configuring an academy.
    pub fn builder() -> AcademyBuilder {
        AcademyBuilder::default()
    }

    /// An academy over an already opened channel, or a local one without.
    pub fn new(channel: Option<SharedMemoryChannel>, side_channels: SideChannelRegistry) -> Self {
        Self {
            channel: channel.map(|channel| Arc::new(Mutex::new(channel))),
            side_channels,
            outgoing: Vec::new(),
            worlds: Vec::new(),
            handshake_done: false,
            closed: false,
            engine_configuration: None,
        }
    }

    /// Registers `buffer` as `name`.
    ///
    /// With a trainer attached the world is answered remotely; otherwise by
    /// `fallback`, or by a [`NullProcessor`] when there is none.
    pub fn subscribe_world(
        &mut self,
        name: &str,
        buffer: DecisionBuffer,
        fallback: Option<Box<dyn WorldProcessor>>,
    ) -> ProcessResult<WorldId> {
        let processor: Box<dyn WorldProcessor> = match &self.channel {
            Some(channel) => Box::new(RemoteProcessor::new(Arc::clone(channel), name)),
            None => fallback.unwrap_or_else(|| Box::new(NullProcessor)),
        };
        self.insert(name, buffer, processor)
    }

    /// Registers `buffer` with a processor that stays in-process even when a
    /// trainer is attached.
    pub fn subscribe_world_local<P: WorldProcessor + 'static>(
        &mut self,
        name: &str,
        buffer: DecisionBuffer,
        processor: P,
    ) -> ProcessResult<WorldId> {
        self.insert(name, buffer, Box::new(processor))
    }

    fn insert(
        &mut self,
        name: &str,
        buffer: DecisionBuffer,
        processor: Box<dyn WorldProcessor>,
    ) -> ProcessResult<WorldId> {
        validate_world_name(name)?;
        if self.worlds.iter().any(|world| world.name == name) {
            return Err(ProcessError::DuplicateWorld {
                name: name.to_owned(),
            });
        }
        info!(world = name, processor = processor.name(), "subscribed world");
        self.worlds.push(WorldSlot {
            name: name.to_owned(),
            buffer,
            processor,
        });
        Ok(WorldId(self.worlds.len() - 1))
    }

    /// Decision buffer of `id`.
    pub fn buffer(&self, id: WorldId) -> Option<&DecisionBuffer> {
        self.worlds.get(id.0).map(|world| &world.buffer)
    }

    /// Mutable decision buffer of `id`.
    pub fn buffer_mut(&mut self, id: WorldId) -> Option<&mut DecisionBuffer> {
        self.worlds.get_mut(id.0).map(|world| &mut world.buffer)
    }

    /// Name of the processor answering `id`.
    pub fn processor_name(&self, id: WorldId) -> Option<&'static str> {
        self.worlds.get(id.0).map(|world| world.processor.name())
    }

    /// Subscribed names, in registration order.
    pub fn world_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.worlds.iter().map(|world| world.name.as_str())
    }

    /// Whether a trainer is attached.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Whether the trainer ended the session; no further step will run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Latest engine settings sent by the trainer, when the built-in handler
    /// was installed by the builder.
    pub fn engine_configuration(&self) -> Option<&EngineConfigurationHandle> {
        self.engine_configuration.as_ref()
    }

    /// Runs the processor of one world if it has requested decisions.
    pub fn update_world(&mut self, id: WorldId) -> ProcessResult<StepOutcome> {
        if self.closed {
            return Err(ProcessError::Closed);
        }
        let world = self.worlds.get(id.0).ok_or(ProcessError::UnknownWorld(id))?;
        if world.buffer.decisions_requested() == 0 {
            return Ok(StepOutcome::Idle);
        }
        let remote = world.processor.is_remote();

        if remote {
            if let Some(outcome) = self.handshake()? {
                return Ok(outcome);
            }
            self.send_side_channels()?;
        } else if self.channel.is_none() {
            self.discard_side_channels();
        }

        let world = &mut self.worlds[id.0];
        trace!(
            world = %world.name,
            agents = world.buffer.decisions_requested(),
            processor = world.processor.name(),
            "processing world"
        );
        let command = world.processor.process(&mut world.buffer)?;

        if remote {
            self.receive_side_channels()?;
        }
        Ok(self.apply(command))
    }

    /// Updates every world in registration order.
    pub fn step(&mut self) -> ProcessResult<StepOutcome> {
        if self.closed {
            return Err(ProcessError::Closed);
        }
        let mut outcome = StepOutcome::Idle;
        for index in 0..self.worlds.len() {
            if self.closed {
                break;
            }
            outcome = outcome.max(self.update_world(WorldId(index))?);
        }
        Ok(outcome)
    }

    /// Clears per-step state of every world.
    pub fn reset_all(&mut self) {
        for world in &mut self.worlds {
            world.processor.reset(&mut world.buffer);
        }
    }

    /// Waits for the trainer's first turn. `Some` when it opened with a
    /// reset or close instead of a plain go-ahead.
    fn handshake(&mut self) -> ProcessResult<Option<StepOutcome>> {
        if self.handshake_done {
            return Ok(None);
        }
        let Some(channel) = &self.channel else {
            return Ok(None);
        };
        let command = channel.lock().wait_for_turn()?;
        self.handshake_done = true;
        debug!(?command, "trainer handed over the first turn");
        self.receive_side_channels()?;
        match command {
            Command::Default => Ok(None),
            Command::Reset => Ok(Some(self.apply(WorldCommand::Reset))),
            Command::Close => Ok(Some(self.apply(WorldCommand::Close))),
            Command::ChangeFile => Err(ProcessError::UnexpectedCommand(command)),
        }
    }

    fn send_side_channels(&mut self) -> ProcessResult<()> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        self.side_channels.collect_outgoing(&mut self.outgoing);
        channel.lock().write_side_channel_data(&self.outgoing)?;
        Ok(())
    }

    fn receive_side_channels(&mut self) -> ProcessResult<()> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        let data = channel.lock().read_and_clear_side_channel_data()?;
        if !data.is_empty() {
            let report = self.side_channels.dispatch(&data);
            trace!(
                delivered = report.delivered,
                unknown = report.unknown,
                "dispatched side-channel data"
            );
        }
        Ok(())
    }

    fn discard_side_channels(&mut self) {
        self.side_channels.collect_outgoing(&mut self.outgoing);
        if !self.outgoing.is_empty() {
            trace!(len = self.outgoing.len(), "no trainer attached, dropping side-channel data");
            self.outgoing.clear();
        }
    }

    fn apply(&mut self, command: WorldCommand) -> StepOutcome {
        match command {
            WorldCommand::Default => StepOutcome::Stepped,
            WorldCommand::Reset => {
                info!("resetting all worlds");
                self.reset_all();
                StepOutcome::Reset
            }
            WorldCommand::Close => {
                info!("trainer closed the session");
                self.closed = true;
                StepOutcome::Closed
            }
        }
    }
}

impl std::fmt::Debug for Academy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Academy")
            .field("worlds", &self.world_names().collect::<Vec<_>>())
            .field("connected", &self.is_connected())
            .field("closed", &self.closed)
            .field("side_channels", &self.side_channels)
            .finish()
    }
}

/// Collects what an [`Academy`] needs before the first step.
///
/// The side-channel registry is moved into the academy on
/// [`build`](Self::build) and cannot be extended afterwards.
#[derive(Debug, Default)]
pub struct AcademyBuilder {
    config: ChannelConfig,
    side_channels: SideChannelRegistry,
    memory_path: Option<PathBuf>,
}

impl AcademyBuilder {
    /// Overrides hand-off suffix, API version and polling.
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds one side-channel handler.
    pub fn side_channel<C: SideChannel + 'static>(mut self, channel: C) -> ProcessResult<Self> {
        self.side_channels.register(channel)?;
        Ok(self)
    }

    /// Replaces every handler registered so far.
    pub fn side_channels(mut self, registry: SideChannelRegistry) -> Self {
        self.side_channels = registry;
        self
    }

    /// Attaches to the trainer's file at `path`.
    pub fn memory_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.memory_path = Some(path.into());
        self
    }

    /// Resolves the trainer's file from process arguments; see
    /// [`transport::memory_path_from_args`].
    pub fn memory_path_from_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.memory_path = memory_path_from_args(args);
        self
    }

    /// Opens the channel, if any, and installs the engine configuration
    /// handler unless one was registered already.
    pub fn build(self) -> ProcessResult<Academy> {
        let mut side_channels = self.side_channels;
        let engine_configuration = if side_channels
            .channel_ids()
            .any(|id| id == ENGINE_CONFIGURATION_CHANNEL_ID)
        {
            None
        } else {
            let (channel, handle) = EngineConfigurationChannel::new();
            side_channels.register(channel)?;
            Some(handle)
        };

        let channel = match &self.memory_path {
            Some(path) => Some(SharedMemoryChannel::open(path, Role::Simulation, self.config)?),
            None => None,
        };
        info!(
            memory_path = ?self.memory_path,
            side_channels = side_channels.len(),
            "academy ready"
        );

        let mut academy = Academy::new(channel, side_channels);
        academy.engine_configuration = engine_configuration;
        Ok(academy)
    }
}
