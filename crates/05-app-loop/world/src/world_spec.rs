//! Immutable description of one policy world: capacity, observation shapes
//! and the action space.

use crate::error::{WorldError, WorldResult};
use bytemuck::Pod;
use smallvec::SmallVec;
use std::mem;

/// Up to three observation dimensions. Unused trailing dimensions are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ObservationShape {
    /// First dimension; must be non-zero.
    pub x: u32,
    /// Second dimension, or zero when absent.
    pub y: u32,
    /// Third dimension, or zero when absent.
    pub z: u32,
}

impl ObservationShape {
    /// Creates a shape from explicit dimensions.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// A flat vector observation of `len` values.
    pub const fn vector(len: u32) -> Self {
        Self::new(len, 0, 0)
    }

    /// Number of `f32` values one agent writes for this shape.
    ///
    /// Saturates at `usize::MAX`; a validated [`WorldSpec`] never holds such a shape.
    pub fn element_count(&self) -> usize {
        self.checked_element_count().unwrap_or(usize::MAX)
    }

    /// Like [`element_count`](Self::element_count), or `None` when the product overflows.
    pub fn checked_element_count(&self) -> Option<usize> {
        (self.x as usize)
            .checked_mul(self.y.max(1) as usize)?
            .checked_mul(self.z.max(1) as usize)
    }

    /// Dimensions in wire order.
    pub fn dims(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Action space of a world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionSpace {
    /// Fixed-width `f32` action vector.
    Continuous {
        /// Values per agent.
        size: usize,
    },
    /// One `i32` choice per branch, each in `0..cardinality`.
    Discrete {
        /// Cardinality of every branch.
        branches: SmallVec<[usize; 4]>,
    },
}

impl ActionSpace {
    /// Returns true for continuous action spaces.
    pub fn is_continuous(&self) -> bool {
        matches!(self, ActionSpace::Continuous { .. })
    }

    /// Number of action elements per agent.
    pub fn width(&self) -> usize {
        match self {
            ActionSpace::Continuous { size } => *size,
            ActionSpace::Discrete { branches } => branches.len(),
        }
    }

    /// Branch cardinalities; empty for continuous spaces.
    pub fn branches(&self) -> &[usize] {
        match self {
            ActionSpace::Continuous { .. } => &[],
            ActionSpace::Discrete { branches } => branches,
        }
    }

    /// Mask entries per agent, one per branch choice.
    pub fn mask_width(&self) -> usize {
        self.branches().iter().sum()
    }
}

/// Validated world declaration. Construct with [`WorldSpec::builder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldSpec {
    capacity: usize,
    observations: SmallVec<[ObservationShape; 4]>,
    actions: ActionSpace,
}

impl WorldSpec {
    /// Starts a declaration for a world holding at most `capacity` decisions per step.
    pub fn builder(capacity: usize) -> WorldSpecBuilder {
        WorldSpecBuilder {
            capacity,
            observations: SmallVec::new(),
            actions: None,
            action_record: None,
        }
    }

    /// Maximum decisions per step.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Declared observation shapes in index order.
    pub fn observations(&self) -> &[ObservationShape] {
        &self.observations
    }

    /// Declared action space.
    pub fn actions(&self) -> &ActionSpace {
        &self.actions
    }
}

/// Builder for [`WorldSpec`].
#[derive(Clone, Debug)]
pub struct WorldSpecBuilder {
    capacity: usize,
    observations: SmallVec<[ObservationShape; 4]>,
    actions: Option<ActionSpace>,
    action_record: Option<usize>,
}

impl WorldSpecBuilder {
    /// Appends an observation shape; its index is the number of shapes declared before it.
    pub fn observation(mut self, shape: ObservationShape) -> Self {
        self.observations.push(shape);
        self
    }

    /// Declares a continuous action vector of `size` values.
    pub fn continuous_actions(mut self, size: usize) -> Self {
        self.actions = Some(ActionSpace::Continuous { size });
        self
    }

    /// Declares discrete branches with the given cardinalities.
    pub fn discrete_actions(mut self, branches: &[usize]) -> Self {
        self.actions = Some(ActionSpace::Discrete {
            branches: SmallVec::from_slice(branches),
        });
        self
    }

    /// Binds the record type actions will be read as; its size is checked at build time.
    pub fn action_record<A: Pod>(mut self) -> Self {
        self.action_record = Some(mem::size_of::<A>());
        self
    }

    /// Validates the declaration.
    pub fn build(self) -> WorldResult<WorldSpec> {
        if self.capacity == 0 || i32::try_from(self.capacity).is_err() {
            return Err(WorldError::Configuration(format!(
                "capacity {} must be in 1..=i32::MAX",
                self.capacity
            )));
        }
        for (index, shape) in self.observations.iter().enumerate() {
            let values = shape
                .checked_element_count()
                .and_then(|count| count.checked_mul(self.capacity))
                .and_then(|values| values.checked_mul(mem::size_of::<f32>()));
            match values {
                None => {
                    return Err(WorldError::Configuration(format!(
                        "observation {index} with dimensions {:?} is too large",
                        shape.dims()
                    )))
                }
                Some(0) => {
                    return Err(WorldError::Configuration(format!(
                        "observation {index} has an empty shape"
                    )))
                }
                Some(_) => {}
            }
        }

        let actions = self.actions.ok_or_else(|| {
            WorldError::Configuration("no action space declared".to_owned())
        })?;
        match &actions {
            ActionSpace::Continuous { size: 0 } => {
                return Err(WorldError::Configuration(
                    "continuous action size must be positive".to_owned(),
                ));
            }
            ActionSpace::Discrete { branches } if branches.is_empty() => {
                return Err(WorldError::Configuration(
                    "discrete action space needs at least one branch".to_owned(),
                ));
            }
            ActionSpace::Discrete { branches } if branches.contains(&0) => {
                return Err(WorldError::Configuration(
                    "discrete branch cardinality must be positive".to_owned(),
                ));
            }
            _ => {}
        }

        if let Some(record_size) = self.action_record {
            let expected = actions.width() * mem::size_of::<f32>();
            if record_size != expected {
                return Err(WorldError::ActionSizeMismatch {
                    expected,
                    actual: record_size,
                });
            }
        }

        Ok(WorldSpec {
            capacity: self.capacity,
            observations: self.observations,
            actions,
        })
    }
}
