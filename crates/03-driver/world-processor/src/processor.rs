use crate::ProcessResult;
use world::DecisionBuffer;

/// What the step loop should do after a world was processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldCommand {
    /// Actions are ready; keep stepping.
    Default,
    /// The trainer asked for an environment reset.
    Reset,
    /// The trainer ended the session.
    Close,
}

/// A source of actions for one [`DecisionBuffer`].
///
/// `process` is called once per step, after the last `request_decision` and
/// before the first action is consumed. When it returns
/// [`WorldCommand::Default`], every requested slot has an action and the
/// buffer's actions are marked ready. Dropping the processor releases whatever
/// it holds.
pub trait WorldProcessor: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether actions come from the trainer process.
    fn is_remote(&self) -> bool {
        false
    }

    /// Fills the actions of every requested slot, or reports a trainer command.
    fn process(&mut self, buffer: &mut DecisionBuffer) -> ProcessResult<WorldCommand>;

    /// Clears per-step counters, dropping requested decisions and published actions.
    fn reset(&mut self, buffer: &mut DecisionBuffer) {
        buffer.reset_decisions_counter();
        buffer.reset_actions_counter();
    }
}

/// Answers every decision with zeroed actions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProcessor;

impl WorldProcessor for NullProcessor {
    fn name(&self) -> &'static str {
        "null"
    }

    fn process(&mut self, buffer: &mut DecisionBuffer) -> ProcessResult<WorldCommand> {
        buffer.actions_mut().clear();
        buffer.mark_actions_ready();
        Ok(WorldCommand::Default)
    }
}
