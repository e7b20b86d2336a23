use crate::{ProcessError, ProcessResult, WorldCommand, WorldProcessor};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem;
use world::{DecisionBuffer, DecisionRef, WorldSpec};

/// Scripted policy: a closure maps each decision to an action record `A`.
///
/// `A` is the world's action segment viewed as a plain record, e.g.
/// `[f32; 2]` for two continuous values or `[i32; 3]` for three branches.
pub struct HeuristicProcessor<A, F> {
    heuristic: F,
    _action: PhantomData<fn() -> A>,
}

impl<A, F> HeuristicProcessor<A, F>
where
    A: Pod,
    F: FnMut(&DecisionRef<'_>) -> A + Send,
{
    /// Fails when `A` is not exactly one action segment of `spec` wide.
    pub fn new(spec: &WorldSpec, heuristic: F) -> ProcessResult<Self> {
        let expected = spec.actions().width() * mem::size_of::<f32>();
        if mem::size_of::<A>() != expected {
            return Err(ProcessError::InvalidConfig(format!(
                "heuristic action is {} bytes, the world expects {expected}",
                mem::size_of::<A>()
            )));
        }
        Ok(Self {
            heuristic,
            _action: PhantomData,
        })
    }
}

impl<A, F> WorldProcessor for HeuristicProcessor<A, F>
where
    A: Pod,
    F: FnMut(&DecisionRef<'_>) -> A + Send,
{
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn process(&mut self, buffer: &mut DecisionBuffer) -> ProcessResult<WorldCommand> {
        {
            let (decisions, mut actions) = buffer.step_views();
            for decision in decisions.iter() {
                let action = (self.heuristic)(&decision);
                actions.write_record(decision.slot(), &action)?;
            }
        }
        buffer.mark_actions_ready();
        Ok(WorldCommand::Default)
    }
}

impl<A, F> std::fmt::Debug for HeuristicProcessor<A, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicProcessor")
            .field("action", &std::any::type_name::<A>())
            .finish()
    }
}
