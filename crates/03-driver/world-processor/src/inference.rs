//! Local inference through a pluggable model.
//!
//! The model sees one batch per step: every requested decision's vector
//! observations concatenated in declaration order, one row per slot.

use crate::{ProcessError, ProcessResult, WorldCommand, WorldProcessor};
use world::{ActionsMut, DecisionBuffer, WorldSpec};

/// A policy evaluated in-process.
pub trait PolicyModel: Send {
    /// Failure reported by the model.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fills `actions` (one segment per row) from `batch` rows of `observations`.
    fn infer(
        &mut self,
        observations: &[f32],
        batch: usize,
        actions: &mut ActionsMut<'_>,
    ) -> Result<(), Self::Error>;
}

/// Runs a [`PolicyModel`] over the requested decisions.
#[derive(Debug)]
pub struct InferenceProcessor<M> {
    model: M,
    row_width: usize,
    rows: Vec<f32>,
}

impl<M: PolicyModel> InferenceProcessor<M> {
    /// Only flat vector observations can be batched; other shapes are rejected here.
    pub fn new(spec: &WorldSpec, model: M) -> ProcessResult<Self> {
        if let Some(index) = spec
            .observations()
            .iter()
            .position(|shape| shape.y != 0 || shape.z != 0)
        {
            return Err(ProcessError::InvalidConfig(format!(
                "observation {index} is not a vector; inference batches vector observations only"
            )));
        }
        let row_width = spec
            .observations()
            .iter()
            .map(|shape| shape.element_count())
            .sum::<usize>();
        Ok(Self {
            model,
            row_width,
            rows: Vec::with_capacity(spec.capacity() * row_width),
        })
    }

    /// Values per batch row.
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// The wrapped model.
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: PolicyModel> WorldProcessor for InferenceProcessor<M> {
    fn name(&self) -> &'static str {
        "inference"
    }

    fn process(&mut self, buffer: &mut DecisionBuffer) -> ProcessResult<WorldCommand> {
        {
            let (decisions, mut actions) = buffer.step_views();
            self.rows.clear();
            for decision in decisions.iter() {
                for index in 0..decisions.spec().observations().len() {
                    self.rows
                        .extend_from_slice(decision.observation(index).unwrap_or_default());
                }
            }
            self.model
                .infer(&self.rows, decisions.len(), &mut actions)
                .map_err(|err| ProcessError::Model(Box::new(err)))?;
        }
        buffer.mark_actions_ready();
        Ok(WorldCommand::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use world::{AgentId, ObservationShape};

    #[derive(Debug, thiserror::Error)]
    #[error("model exploded")]
    struct Exploded;

    /// Sums each row into the single continuous action.
    struct RowSum {
        width: usize,
        fail: bool,
    }

    impl PolicyModel for RowSum {
        type Error = Exploded;

        fn infer(
            &mut self,
            observations: &[f32],
            batch: usize,
            actions: &mut ActionsMut<'_>,
        ) -> Result<(), Exploded> {
            if self.fail {
                return Err(Exploded);
            }
            let out = actions.continuous().ok_or(Exploded)?;
            for (row, action) in observations.chunks(self.width).zip(out.iter_mut()).take(batch) {
                *action = row.iter().sum();
            }
            Ok(())
        }
    }

    fn spec() -> WorldSpec {
        WorldSpec::builder(3)
            .observation(ObservationShape::vector(2))
            .observation(ObservationShape::vector(1))
            .continuous_actions(1)
            .build()
            .expect("spec")
    }

    #[test]
    fn rows_concatenate_observations_per_slot() {
        let spec = spec();
        let mut processor =
            InferenceProcessor::new(&spec, RowSum { width: 3, fail: false }).expect("processor");
        assert_eq!(processor.row_width(), 3);
        let mut buffer = DecisionBuffer::new(spec);
        for agent in 0..2 {
            buffer
                .request_decision(AgentId(agent))
                .expect("slot")
                .set_observation_from_slice(0, &[1.0, agent as f32])
                .expect("obs")
                .set_observation_from_slice(1, &[10.0])
                .expect("obs");
        }

        processor.process(&mut buffer).expect("process");
        let sums: Vec<f32> = buffer
            .ready_actions()
            .map(|action| action.continuous().expect("continuous")[0])
            .collect();
        assert_eq!(sums, vec![11.0, 12.0]);
    }

    #[test]
    fn model_failures_surface_as_errors() {
        let spec = spec();
        let mut processor =
            InferenceProcessor::new(&spec, RowSum { width: 3, fail: true }).expect("processor");
        let mut buffer = DecisionBuffer::new(spec);
        buffer.request_decision(AgentId(0)).expect("slot");
        assert!(matches!(
            processor.process(&mut buffer),
            Err(ProcessError::Model(_))
        ));
        assert_eq!(buffer.actions_ready(), 0);
    }

    #[test]
    fn visual_observations_are_rejected() {
        let spec = WorldSpec::builder(1)
            .observation(ObservationShape::new(4, 4, 3))
            .continuous_actions(1)
            .build()
            .expect("spec");
        assert!(matches!(
            InferenceProcessor::new(&spec, RowSum { width: 1, fail: false }),
            Err(ProcessError::InvalidConfig(_))
        ));
    }
}
