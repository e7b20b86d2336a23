//! Plain-text log lines in both directions.

use super::{OutgoingMessages, SideChannel, STRING_LOG_CHANNEL_ID};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

/// Forwards incoming text to `tracing` and sends queued lines to the peer.
#[derive(Debug)]
pub struct StringLogChannel {
    outgoing: Arc<Mutex<VecDeque<String>>>,
}

/// Cloneable handle that queues lines for the next step.
#[derive(Debug, Clone)]
pub struct StringLogSender {
    outgoing: Arc<Mutex<VecDeque<String>>>,
}

impl StringLogChannel {
    /// Creates the channel and the sender that feeds it.
    pub fn new() -> (Self, StringLogSender) {
        let outgoing = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                outgoing: Arc::clone(&outgoing),
            },
            StringLogSender { outgoing },
        )
    }
}

impl StringLogSender {
    /// Queues `line`; it leaves with the next side-channel flush.
    pub fn send(&self, line: impl Into<String>) {
        self.outgoing.lock().push_back(line.into());
    }

    /// Lines waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.outgoing.lock().len()
    }
}

impl SideChannel for StringLogChannel {
    fn channel_id(&self) -> i32 {
        STRING_LOG_CHANNEL_ID
    }

    fn on_message(&mut self, payload: &[u8]) {
        info!(target: "side_channel::string_log", "from peer: {}", String::from_utf8_lossy(payload));
    }

    fn flush_outgoing(&mut self, out: &mut OutgoingMessages<'_>) {
        let mut queue = self.outgoing.lock();
        for line in queue.drain(..) {
            out.push(line.as_bytes());
        }
    }
}
