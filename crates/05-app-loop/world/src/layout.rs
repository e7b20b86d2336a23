//! Flattening of fixed-layout value records into `f32` tensors.
//!
//! A record type is a plain-old-data struct that declares its fields once via
//! [`TensorRecord::declare`]. Numeric fields are copied verbatim, enum fields
//! expand to a one-hot segment. The validated [`TensorLayout`] is cached per
//! type for the lifetime of the process, so encoding never re-inspects the
//! declaration.

use crate::error::LayoutError;
use bytemuck::Pod;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::any::TypeId;
use std::collections::HashMap;
use std::mem;
use std::sync::OnceLock;

const FIELD_ALIGNMENT: usize = 4;
const ELEMENT_SIZE: usize = mem::size_of::<f32>();

/// How a declared field contributes to the flattened tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// `element_count` raw `f32` values copied verbatim.
    Numeric,
    /// One 4-byte integral value expanded to `element_count` one-hot slots.
    Enum,
}

/// One entry of a [`TensorLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutField {
    /// Offset of the field inside the record.
    pub byte_offset: usize,
    /// Output slots produced by the field (cardinality for enums).
    pub element_count: usize,
    /// Encoding applied to the field.
    pub kind: FieldKind,
}

impl LayoutField {
    fn byte_len(&self) -> usize {
        match self.kind {
            FieldKind::Numeric => self.element_count * ELEMENT_SIZE,
            FieldKind::Enum => mem::size_of::<i32>(),
        }
    }
}

/// Plain-old-data record that can be written as an observation.
///
/// Implementors name their fields with [`core::mem::offset_of!`]:
///
/// ```
/// use bytemuck::{Pod, Zeroable};
/// use std::mem::offset_of;
/// use world::{LayoutBuilder, TensorLayout, TensorRecord};
///
/// #[repr(C)]
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// struct Probe {
///     position: [f32; 3],
///     team: u32,
/// }
///
/// impl TensorRecord for Probe {
///     fn declare(fields: &mut LayoutBuilder) {
///         fields
///             .numeric(offset_of!(Probe, position), 3)
///             .one_hot(offset_of!(Probe, team), 2);
///     }
/// }
///
/// assert_eq!(TensorLayout::of::<Probe>().unwrap().width(), 5);
/// ```
pub trait TensorRecord: Pod {
    /// Declares the encoded fields in output order.
    fn declare(fields: &mut LayoutBuilder);
}

impl TensorRecord for f32 {
    fn declare(fields: &mut LayoutBuilder) {
        fields.numeric(0, 1);
    }
}

impl<const N: usize> TensorRecord for [f32; N] {
    fn declare(fields: &mut LayoutBuilder) {
        fields.numeric(0, N);
    }
}

/// Collects field declarations for one record type.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    record_size: usize,
    fields: SmallVec<[LayoutField; 8]>,
}

impl LayoutBuilder {
    /// Starts a declaration for a record of `record_size` bytes.
    pub fn new(record_size: usize) -> Self {
        Self {
            record_size,
            fields: SmallVec::new(),
        }
    }

    /// Starts a declaration sized for `T`.
    pub fn for_record<T: Pod>() -> Self {
        Self::new(mem::size_of::<T>())
    }

    /// Declares `element_count` consecutive `f32` values at `byte_offset`.
    pub fn numeric(&mut self, byte_offset: usize, element_count: usize) -> &mut Self {
        self.fields.push(LayoutField {
            byte_offset,
            element_count,
            kind: FieldKind::Numeric,
        });
        self
    }

    /// Declares a 4-byte integral enum at `byte_offset` with `cardinality` variants.
    pub fn one_hot(&mut self, byte_offset: usize, cardinality: usize) -> &mut Self {
        self.fields.push(LayoutField {
            byte_offset,
            element_count: cardinality,
            kind: FieldKind::Enum,
        });
        self
    }

    /// Validates the declaration and produces the layout.
    pub fn build(&self) -> Result<TensorLayout, LayoutError> {
        if self.fields.is_empty() {
            return Err(LayoutError::NoFields);
        }

        let mut claimed: SmallVec<[(usize, usize); 8]> = SmallVec::new();
        for field in &self.fields {
            let start = field.byte_offset;
            if field.element_count == 0 {
                return Err(LayoutError::EmptyField { byte_offset: start });
            }
            if start % FIELD_ALIGNMENT != 0 {
                return Err(LayoutError::MisalignedField { byte_offset: start });
            }
            let len = field.byte_len();
            let end = start
                .checked_add(len)
                .filter(|end| *end <= self.record_size)
                .ok_or(LayoutError::FieldOutOfBounds {
                    byte_offset: start,
                    len,
                    record_size: self.record_size,
                })?;
            if claimed
                .iter()
                .any(|&(other_start, other_end)| start < other_end && other_start < end)
            {
                return Err(LayoutError::OverlappingFields { byte_offset: start });
            }
            claimed.push((start, end));
        }

        Ok(TensorLayout {
            record_size: self.record_size,
            width: self.fields.iter().map(|field| field.element_count).sum(),
            fields: self.fields.clone(),
        })
    }
}

/// Validated, ordered mapping from a record's bytes to a flat tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorLayout {
    record_size: usize,
    width: usize,
    fields: SmallVec<[LayoutField; 8]>,
}

type LayoutCache = RwLock<HashMap<TypeId, &'static TensorLayout>>;

fn layout_cache() -> &'static LayoutCache {
    static CACHE: OnceLock<LayoutCache> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

impl TensorLayout {
    /// Returns the cached layout for `T`, validating its declaration on first use.
    pub fn of<T: TensorRecord>() -> Result<&'static TensorLayout, LayoutError> {
        let key = TypeId::of::<T>();
        if let Some(layout) = layout_cache().read().get(&key).copied() {
            return Ok(layout);
        }

        let layout = Self::compute::<T>()?;
        let mut cache = layout_cache().write();
        // Racing first uses may both compute; the first insert wins and the
        // loser's layout is discarded before it is leaked.
        Ok(*cache
            .entry(key)
            .or_insert_with(|| Box::leak(Box::new(layout))))
    }

    /// Builds the layout for `T` without consulting the cache.
    pub fn compute<T: TensorRecord>() -> Result<Self, LayoutError> {
        let mut builder = LayoutBuilder::for_record::<T>();
        T::declare(&mut builder);
        builder.build()
    }

    /// Number of `f32` values one record flattens to.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Size in bytes of the source record.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Declared fields in output order.
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Flattens `record` into `out`. On error the contents of `out` are unspecified.
    pub fn encode(&self, record: &[u8], out: &mut [f32]) -> Result<(), LayoutError> {
        if record.len() != self.record_size {
            return Err(LayoutError::SizeMismatch {
                expected: self.record_size,
                actual: record.len(),
            });
        }
        if out.len() != self.width {
            return Err(LayoutError::SizeMismatch {
                expected: self.width,
                actual: out.len(),
            });
        }

        let mut cursor = 0;
        for field in &self.fields {
            let segment = &mut out[cursor..cursor + field.element_count];
            match field.kind {
                FieldKind::Numeric => {
                    let bytes = &record[field.byte_offset..field.byte_offset + field.byte_len()];
                    for (value, chunk) in segment.iter_mut().zip(bytes.chunks_exact(ELEMENT_SIZE)) {
                        *value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    }
                }
                FieldKind::Enum => {
                    let raw = read_i32(record, field.byte_offset);
                    let index = usize::try_from(raw)
                        .ok()
                        .filter(|index| *index < field.element_count)
                        .ok_or(LayoutError::EnumValueOutOfRange {
                            value: i64::from(raw),
                            cardinality: field.element_count,
                            byte_offset: field.byte_offset,
                        })?;
                    segment.fill(0.0);
                    segment[index] = 1.0;
                }
            }
            cursor += field.element_count;
        }
        Ok(())
    }

    /// Flattens a typed record. `T` must be the type this layout was built for.
    pub fn encode_record<T: Pod>(&self, record: &T, out: &mut [f32]) -> Result<(), LayoutError> {
        self.encode(bytemuck::bytes_of(record), out)
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
