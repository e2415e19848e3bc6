//! Asynchronous reporting of delivery outcomes.
//!
//! Nothing here ever returns an error into the application's log call; drops
//! and abandoned batches are surfaced through an optional callback or, by
//! default, through `tracing` (which is independent of the records being
//! shipped, so the forwarder never recurses into the path it serves).

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Why records were dropped before reaching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Queue at capacity under a drop policy.
    QueueFull,
    /// `Block` policy timed out waiting for space.
    EnqueueTimeout,
    /// Enqueue after shutdown began.
    Shutdown,
}

/// Why a batch was abandoned without delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// Non-retryable HTTP rejection (4xx other than 429).
    Rejected { status: u16, body: String },
    /// Retry budget exhausted.
    RetriesExhausted,
    /// Payload could not be serialized.
    Serialization,
    /// Shutdown grace period expired or delivery was cancelled.
    ShutdownExpired,
}

#[derive(Debug, Clone)]
pub enum ForwarderEvent {
    RecordsDropped {
        count: u64,
        reason: DropReason,
    },
    BatchDelivered {
        batch_id: String,
        entries: usize,
        attempts: u32,
    },
    BatchAbandoned {
        batch_id: String,
        entries: usize,
        attempts: u32,
        reason: AbandonReason,
    },
    ShutdownForced {
        undelivered: u64,
    },
}

pub type EventCallback = Arc<dyn Fn(&ForwarderEvent) + Send + Sync>;

/// Sink for [`ForwarderEvent`]s, shared between the producer side and the
/// worker. Without a callback installed, falls back to tracing.
#[derive(Clone, Default)]
pub struct EventSink {
    callback: Option<EventCallback>,
}

impl EventSink {
    pub fn new(callback: Option<EventCallback>) -> Self {
        Self { callback }
    }

    pub fn emit(&self, event: ForwarderEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
            return;
        }

        match &event {
            ForwarderEvent::RecordsDropped { count, reason } => {
                warn!(count, ?reason, "log records dropped");
            }
            ForwarderEvent::BatchDelivered {
                batch_id,
                entries,
                attempts,
            } => {
                debug!(batch_id, entries, attempts, "batch delivered");
            }
            ForwarderEvent::BatchAbandoned {
                batch_id,
                entries,
                attempts,
                reason,
            } => {
                error!(batch_id, entries, attempts, ?reason, "batch abandoned");
            }
            ForwarderEvent::ShutdownForced { undelivered } => {
                warn!(undelivered, "shutdown grace period expired");
            }
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
