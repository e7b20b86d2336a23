//! Error surface for world construction, decision writes and record layouts.

use thiserror::Error;

/// Convenience result alias for fallible world operations.
pub type WorldResult<T, E = WorldError> = Result<T, E>;

/// Failures raised while declaring or encoding a [`TensorRecord`](crate::TensorRecord).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// An enum field held a value outside `0..cardinality`.
    #[error("enum value {value} at byte offset {byte_offset} is outside 0..{cardinality}")]
    EnumValueOutOfRange {
        /// Raw value read from the record.
        value: i64,
        /// Declared number of variants.
        cardinality: usize,
        /// Byte offset of the offending field.
        byte_offset: usize,
    },
    /// Fields must start on a 4-byte boundary.
    #[error("field at byte offset {byte_offset} is not 4-byte aligned")]
    MisalignedField {
        /// Byte offset of the offending field.
        byte_offset: usize,
    },
    /// A field runs past the end of the record.
    #[error("field at byte offset {byte_offset} spanning {len} bytes overruns a {record_size}-byte record")]
    FieldOutOfBounds {
        /// Byte offset of the offending field.
        byte_offset: usize,
        /// Number of bytes the field claims.
        len: usize,
        /// Size of the record type.
        record_size: usize,
    },
    /// Two declared fields share bytes.
    #[error("field at byte offset {byte_offset} overlaps a previously declared field")]
    OverlappingFields {
        /// Byte offset of the later field.
        byte_offset: usize,
    },
    /// A numeric field with zero elements or an enum with zero variants.
    #[error("field at byte offset {byte_offset} declares no elements")]
    EmptyField {
        /// Byte offset of the offending field.
        byte_offset: usize,
    },
    /// The record declared nothing to encode.
    #[error("record declares no fields")]
    NoFields,
    /// Input bytes or output floats do not match the layout.
    #[error("layout expects {expected} elements, got {actual}")]
    SizeMismatch {
        /// Length required by the layout.
        expected: usize,
        /// Length supplied by the caller.
        actual: usize,
    },
}

/// Errors surfaced by [`WorldSpec`](crate::WorldSpec) validation and
/// [`DecisionBuffer`](crate::DecisionBuffer) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The world declaration is unusable; raised at construction time.
    #[error("invalid world configuration: {0}")]
    Configuration(String),
    /// Every slot of the current step is already reserved.
    #[error("decision buffer is full ({capacity} slots)")]
    CapacityExceeded {
        /// Fixed capacity of the buffer.
        capacity: usize,
    },
    /// Observation index outside the declared shapes.
    #[error("observation index {index} is out of range ({count} shapes declared)")]
    UnknownObservation {
        /// Requested shape index.
        index: usize,
        /// Number of declared shapes.
        count: usize,
    },
    /// Observation data does not match the declared shape size.
    #[error("observation {index} expects {expected} values, got {actual}")]
    ObservationSizeMismatch {
        /// Shape index being written.
        index: usize,
        /// Element count of the shape.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    /// Action masks only exist for discrete action spaces.
    #[error("action masks require a discrete action space")]
    NotDiscrete,
    /// Mask coordinates outside the declared branches.
    #[error("action mask branch {branch} choice {action} is out of range")]
    MaskOutOfRange {
        /// Branch index.
        branch: usize,
        /// Choice inside the branch.
        action: usize,
    },
    /// An action record does not cover exactly one slot's action segment.
    #[error("action record of {actual} bytes does not match the {expected}-byte action segment")]
    ActionSizeMismatch {
        /// Bytes in one slot's action segment.
        expected: usize,
        /// Bytes in the supplied record type.
        actual: usize,
    },
    /// Slot index beyond the decisions requested this step.
    #[error("slot {slot} was not requested this step ({requested} requested)")]
    SlotNotRequested {
        /// Offending slot.
        slot: usize,
        /// Decisions requested this step.
        requested: usize,
    },
    /// Encoding an observation record failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}
