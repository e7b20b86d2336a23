//! Spin, yield, then sleep while the peer holds the turn.
//!
//! The peer is another process, so there is no futex to park on; the ready
//! flag lives in a file mapping. Short waits stay on-core, long waits back off
//! to the configured sleep interval.

use crate::config::PollConfig;
use std::hint;
use std::thread;

/// Escalating wait strategy driven by [`PollConfig`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: PollConfig,
    step: u32,
}

/// What the last [`Backoff::snooze`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffPhase {
    /// Busy-spun.
    Spin,
    /// Yielded the time slice.
    Yield,
    /// Slept for the configured interval.
    Sleep,
}

impl Backoff {
    /// Starts a fresh wait.
    pub fn new(config: PollConfig) -> Self {
        Self { config, step: 0 }
    }

    /// Waits a little longer than last time.
    pub fn snooze(&mut self) -> BackoffPhase {
        let spins = self.config.spin_iterations;
        let phase = if self.step < spins {
            hint::spin_loop();
            BackoffPhase::Spin
        } else if self.step < spins.saturating_mul(2) {
            thread::yield_now();
            BackoffPhase::Yield
        } else {
            thread::sleep(self.config.sleep());
            BackoffPhase::Sleep
        };
        self.step = self.step.saturating_add(1);
        phase
    }

    /// Restarts from the spin phase.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
