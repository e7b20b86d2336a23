//! Engine settings pushed by the trainer: time scale, frame rates, quality
//! level and screen resolution.
//!
//! Each message is an `i32` setting tag followed by its little-endian value(s).

use super::{MessageReader, SideChannel, ENGINE_CONFIGURATION_CHANNEL_ID};
use crate::{TransportError, TransportResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lower bound applied to received time scales.
pub const MIN_TIME_SCALE: f32 = 0.01;
/// Upper bound applied to received time scales.
pub const MAX_TIME_SCALE: f32 = 100.0;

const SCREEN_RESOLUTION: i32 = 0;
const QUALITY_LEVEL: i32 = 1;
const TIME_SCALE: i32 = 2;
const TARGET_FRAME_RATE: i32 = 3;
const CAPTURE_FRAME_RATE: i32 = 4;

/// One setting change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConfigurationUpdate {
    /// Window size in pixels.
    ScreenResolution {
        /// Width in pixels.
        width: i32,
        /// Height in pixels.
        height: i32,
    },
    /// Rendering quality preset index.
    QualityLevel(i32),
    /// Simulation speed multiplier.
    TimeScale(f32),
    /// Frame rate the engine aims for.
    TargetFrameRate(i32),
    /// Fixed frame rate used for capture.
    CaptureFrameRate(i32),
}

impl ConfigurationUpdate {
    /// Encodes the update as a message body.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12);
        match *self {
            ConfigurationUpdate::ScreenResolution { width, height } => {
                out.extend_from_slice(&SCREEN_RESOLUTION.to_le_bytes());
                out.extend_from_slice(&width.to_le_bytes());
                out.extend_from_slice(&height.to_le_bytes());
            }
            ConfigurationUpdate::QualityLevel(level) => {
                out.extend_from_slice(&QUALITY_LEVEL.to_le_bytes());
                out.extend_from_slice(&level.to_le_bytes());
            }
            ConfigurationUpdate::TimeScale(scale) => {
                out.extend_from_slice(&TIME_SCALE.to_le_bytes());
                out.extend_from_slice(&scale.to_le_bytes());
            }
            ConfigurationUpdate::TargetFrameRate(rate) => {
                out.extend_from_slice(&TARGET_FRAME_RATE.to_le_bytes());
                out.extend_from_slice(&rate.to_le_bytes());
            }
            ConfigurationUpdate::CaptureFrameRate(rate) => {
                out.extend_from_slice(&CAPTURE_FRAME_RATE.to_le_bytes());
                out.extend_from_slice(&rate.to_le_bytes());
            }
        }
        out
    }

    /// Decodes a message body.
    pub fn decode(payload: &[u8]) -> TransportResult<Self> {
        let mut reader = MessageReader::new(payload);
        let update = match reader.read_i32()? {
            SCREEN_RESOLUTION => ConfigurationUpdate::ScreenResolution {
                width: reader.read_i32()?,
                height: reader.read_i32()?,
            },
            QUALITY_LEVEL => ConfigurationUpdate::QualityLevel(reader.read_i32()?),
            TIME_SCALE => ConfigurationUpdate::TimeScale(reader.read_f32()?),
            TARGET_FRAME_RATE => ConfigurationUpdate::TargetFrameRate(reader.read_i32()?),
            CAPTURE_FRAME_RATE => ConfigurationUpdate::CaptureFrameRate(reader.read_i32()?),
            other => {
                return Err(TransportError::Protocol(format!(
                    "unknown engine configuration tag {other}"
                )))
            }
        };
        Ok(update)
    }
}

/// Latest value of every setting the trainer sent; `None` until first received.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineConfiguration {
    /// Window `(width, height)`.
    pub screen_resolution: Option<(i32, i32)>,
    /// Quality preset.
    pub quality_level: Option<i32>,
    /// Time scale, already clamped to `[MIN_TIME_SCALE, MAX_TIME_SCALE]`.
    pub time_scale: Option<f32>,
    /// Target frame rate.
    pub target_frame_rate: Option<i32>,
    /// Capture frame rate.
    pub capture_frame_rate: Option<i32>,
}

impl EngineConfiguration {
    fn apply(&mut self, update: ConfigurationUpdate) {
        match update {
            ConfigurationUpdate::ScreenResolution { width, height } => {
                self.screen_resolution = Some((width, height));
            }
            ConfigurationUpdate::QualityLevel(level) => self.quality_level = Some(level),
            ConfigurationUpdate::TimeScale(scale) => {
                self.time_scale = Some(scale.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE));
            }
            ConfigurationUpdate::TargetFrameRate(rate) => self.target_frame_rate = Some(rate),
            ConfigurationUpdate::CaptureFrameRate(rate) => self.capture_frame_rate = Some(rate),
        }
    }
}

/// Receives [`ConfigurationUpdate`]s and publishes them through a handle.
#[derive(Debug)]
pub struct EngineConfigurationChannel {
    state: Arc<Mutex<EngineConfiguration>>,
}

/// Read side of an [`EngineConfigurationChannel`], kept by the host.
#[derive(Debug, Clone)]
pub struct EngineConfigurationHandle {
    state: Arc<Mutex<EngineConfiguration>>,
}

impl EngineConfigurationChannel {
    /// Creates the channel and the host's handle onto it.
    pub fn new() -> (Self, EngineConfigurationHandle) {
        let state = Arc::new(Mutex::new(EngineConfiguration::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            EngineConfigurationHandle { state },
        )
    }
}

impl EngineConfigurationHandle {
    /// Snapshot of the settings received so far.
    pub fn current(&self) -> EngineConfiguration {
        *self.state.lock()
    }
}

impl SideChannel for EngineConfigurationChannel {
    fn channel_id(&self) -> i32 {
        ENGINE_CONFIGURATION_CHANNEL_ID
    }

    fn on_message(&mut self, payload: &[u8]) {
        match ConfigurationUpdate::decode(payload) {
            Ok(update) => {
                debug!(?update, "engine configuration update");
                self.state.lock().apply(update);
            }
            Err(err) => warn!(%err, "ignoring engine configuration message"),
        }
    }
}
