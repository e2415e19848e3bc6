use serde::Deserialize;
use std::time::Duration;

/// Behaviour of the queue when a producer hits capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum OverflowPolicy {
    /// Block the producer until space frees up, at most `timeout`, then fail
    /// the enqueue.
    Block { timeout: Duration },
    /// Evict the oldest queued record to make room for the new one.
    DropOldest,
    /// Reject the new record.
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        // Producers sit on application log calls; near-zero blocking is the
        // safe default.
        Self::DropNewest
    }
}
