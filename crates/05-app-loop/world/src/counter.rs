//! Lock-free slot reservation counter.
//!
//! Workers race on a single compare-and-increment. The counter saturates at
//! capacity instead of overshooting, so a full buffer fails the same way
//! regardless of how many workers arrive late.

#[cfg(feature = "loom")]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(feature = "loom"))]
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub(crate) struct DecisionCounter {
    requested: AtomicU32,
    capacity: u32,
}

impl DecisionCounter {
    pub(crate) fn new(capacity: u32) -> Self {
        Self {
            requested: AtomicU32::new(0),
            capacity,
        }
    }

    /// Claims the next free slot, or `None` once `capacity` slots are taken.
    pub(crate) fn try_reserve(&self) -> Option<u32> {
        self.requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < self.capacity).then_some(count + 1)
            })
            .ok()
    }

    pub(crate) fn load(&self) -> u32 {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&mut self) {
        self.requested.store(0, Ordering::Release);
    }
}
