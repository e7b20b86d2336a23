//! Out-of-band messages multiplexed through the side-channel region.
//!
//! The region holds a sequence of `{i32 channel_id, i32 length, bytes}` frames.
//! A [`SideChannelRegistry`] routes incoming frames to the handler registered
//! for their id and gathers the handlers' outgoing messages into one buffer.
//! Unknown ids and malformed framing are logged and dropped, never fatal.

mod engine_config;
mod string_log;

pub use engine_config::{
    ConfigurationUpdate, EngineConfiguration, EngineConfigurationChannel,
    EngineConfigurationHandle, MAX_TIME_SCALE, MIN_TIME_SCALE,
};
pub use string_log::{StringLogChannel, StringLogSender};

use crate::header::{read_i32, read_len};
use crate::{TransportError, TransportResult};
use tracing::{error, warn};

/// Id of the built-in [`EngineConfigurationChannel`].
pub const ENGINE_CONFIGURATION_CHANNEL_ID: i32 = 1;
/// Id of the built-in [`StringLogChannel`].
pub const STRING_LOG_CHANNEL_ID: i32 = 2;

const FRAME_HEADER: usize = 8;

/// One framed message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideChannelMessage<'a> {
    /// Target channel.
    pub channel_id: i32,
    /// Message body.
    pub payload: &'a [u8],
}

/// Appends one frame to `out`.
pub fn frame_message(out: &mut Vec<u8>, channel_id: i32, payload: &[u8]) {
    out.extend_from_slice(&channel_id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Iterates the frames in `data`. Stops after the first malformed frame.
pub fn parse_messages(data: &[u8]) -> SideChannelFrames<'_> {
    SideChannelFrames {
        data,
        cursor: 0,
        failed: false,
    }
}

/// Iterator returned by [`parse_messages`].
#[derive(Debug, Clone)]
pub struct SideChannelFrames<'a> {
    data: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl<'a> Iterator for SideChannelFrames<'a> {
    type Item = TransportResult<SideChannelMessage<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.data.len() {
            return None;
        }
        let frame = self.next_frame();
        self.failed = frame.is_err();
        Some(frame)
    }
}

impl<'a> SideChannelFrames<'a> {
    fn next_frame(&mut self) -> TransportResult<SideChannelMessage<'a>> {
        let data = self.data;
        let start = self.cursor;
        if data.len() - start < FRAME_HEADER {
            return Err(TransportError::Protocol(format!(
                "side-channel frame header at offset {start} is truncated"
            )));
        }
        let channel_id = read_i32(data, start);
        let len = read_len(data, start + 4, "side-channel message length")?;
        let body = start + FRAME_HEADER;
        if data.len() - body < len {
            return Err(TransportError::Protocol(format!(
                "side-channel message for channel {channel_id} declares {len} bytes, {} remain",
                data.len() - body
            )));
        }
        self.cursor = body + len;
        Ok(SideChannelMessage {
            channel_id,
            payload: &data[body..body + len],
        })
    }
}

/// Sink handed to [`SideChannel::flush_outgoing`]; frames with the channel's id.
#[derive(Debug)]
pub struct OutgoingMessages<'a> {
    out: &'a mut Vec<u8>,
    channel_id: i32,
}

impl OutgoingMessages<'_> {
    /// Queues `payload` for the peer.
    pub fn push(&mut self, payload: &[u8]) {
        frame_message(self.out, self.channel_id, payload);
    }
}

/// A handler for one side-channel id.
pub trait SideChannel: Send {
    /// Id this handler answers to.
    fn channel_id(&self) -> i32;

    /// Handles one incoming message body.
    fn on_message(&mut self, payload: &[u8]);

    /// Moves queued outgoing messages into `out`. Called once per step.
    fn flush_outgoing(&mut self, out: &mut OutgoingMessages<'_>) {
        let _ = out;
    }
}

/// Counts from one [`SideChannelRegistry::dispatch`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages handed to a handler.
    pub delivered: usize,
    /// Messages dropped because no handler owns their id.
    pub unknown: usize,
    /// Whether trailing bytes were dropped as malformed.
    pub malformed: bool,
}

/// Set of side-channel handlers, keyed by id.
///
/// Build it before stepping starts and hand it to the driving loop; it offers
/// no way to register handlers once moved there.
#[derive(Default)]
pub struct SideChannelRegistry {
    channels: Vec<Box<dyn SideChannel>>,
}

impl SideChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler; ids must be unique.
    pub fn register<C: SideChannel + 'static>(&mut self, channel: C) -> TransportResult<()> {
        let channel_id = channel.channel_id();
        if self.channels.iter().any(|existing| existing.channel_id() == channel_id) {
            return Err(TransportError::DuplicateSideChannel { channel_id });
        }
        self.channels.push(Box::new(channel));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<C: SideChannel + 'static>(mut self, channel: C) -> TransportResult<Self> {
        self.register(channel)?;
        Ok(self)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true when no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Ids of the registered handlers, in registration order.
    pub fn channel_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.channels.iter().map(|channel| channel.channel_id())
    }

    /// Routes every frame in `data` to its handler.
    pub fn dispatch(&mut self, data: &[u8]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for frame in parse_messages(data) {
            match frame {
                Ok(message) => {
                    match self
                        .channels
                        .iter_mut()
                        .find(|channel| channel.channel_id() == message.channel_id)
                    {
                        Some(channel) => {
                            channel.on_message(message.payload);
                            report.delivered += 1;
                        }
                        None => {
                            let err = TransportError::UnknownSideChannel {
                                channel_id: message.channel_id,
                            };
                            warn!(%err, len = message.payload.len(), "dropping side-channel message");
                            report.unknown += 1;
                        }
                    }
                }
                Err(err) => {
                    error!(%err, "dropping malformed side-channel data");
                    report.malformed = true;
                }
            }
        }
        report
    }

    /// Replaces `out` with the framed outgoing messages of every handler.
    pub fn collect_outgoing(&mut self, out: &mut Vec<u8>) {
        out.clear();
        for channel in &mut self.channels {
            let channel_id = channel.channel_id();
            channel.flush_outgoing(&mut OutgoingMessages {
                out: &mut *out,
                channel_id,
            });
        }
    }
}

impl std::fmt::Debug for SideChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideChannelRegistry")
            .field("channel_ids", &self.channel_ids().collect::<Vec<_>>())
            .finish()
    }
}

/// Little-endian cursor over a message body.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> MessageReader<'a> {
    /// Starts reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn take<const N: usize>(&mut self) -> TransportResult<[u8; N]> {
        let bytes = self
            .data
            .get(self.cursor..self.cursor + N)
            .ok_or_else(|| {
                TransportError::Protocol(format!(
                    "message of {} bytes ends before offset {}",
                    self.data.len(),
                    self.cursor + N
                ))
            })?;
        self.cursor += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads an `i32`.
    pub fn read_i32(&mut self) -> TransportResult<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    /// Reads an `f32`.
    pub fn read_f32(&mut self) -> TransportResult<f32> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.cursor.min(self.data.len())..]
    }
}
