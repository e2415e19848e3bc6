//! Bounded buffering between producers and the shipping worker.

pub mod batch;
pub mod policy;
pub mod queue;

pub use batch::{Batch, BatchConfig, Batcher, SealReason};
pub use policy::OverflowPolicy;
pub use queue::{BoundedQueue, Enqueued, QueueError, QueueStats};
