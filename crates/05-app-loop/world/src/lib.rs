#![deny(missing_docs)]
//! Per-step decision storage for agent simulations.
//!
//! The `world` crate owns everything the simulation side needs before any
//! bytes leave the process:
//! * [`WorldSpec`] – immutable capacity, observation shapes and action space.
//! * [`DecisionBuffer`] – fixed-capacity slots filled concurrently through
//!   [`DecisionHandle`]s and drained through [`ActionView`]s.
//! * [`TensorLayout`] / [`TensorRecord`] – cached flattening of plain records
//!   into `f32` observations with one-hot enums.
//! * [`WorldError`] / [`LayoutError`] – construction and write failures.

mod buffer;
mod cells;
mod counter;
mod error;
mod layout;
mod world_spec;

pub use buffer::{
    ActionSlice, ActionView, ActionsMut, AgentId, DecisionBuffer, DecisionHandle, DecisionRef,
    Decisions,
};
pub use error::{LayoutError, WorldError, WorldResult};
pub use layout::{FieldKind, LayoutBuilder, LayoutField, TensorLayout, TensorRecord};
pub use world_spec::{ActionSpace, ObservationShape, WorldSpec, WorldSpecBuilder};
