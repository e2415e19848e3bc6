use super::OverflowPolicy;
use crate::adapter::NormalizedRecord;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be non-zero")]
    InvalidCapacity,
    #[error("queue is full")]
    Full,
    #[error("enqueue timed out waiting for space")]
    Timeout,
    #[error("queue is closed")]
    Closed,
}

/// Result of a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Stored without displacing anything.
    Stored,
    /// Stored after evicting the oldest queued record (`DropOldest` policy).
    Evicted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub len: usize,
}

/// Thread-safe, capacity-bounded FIFO hand-off between application threads
/// and the shipping worker.
///
/// Producers are plain (possibly non-async) threads and enqueue through a
/// parking_lot mutex; the single consumer is an async task woken through a
/// [`Notify`]. FIFO order is preserved among accepted records.
pub struct BoundedQueue {
    inner: Mutex<VecDeque<NormalizedRecord>>,
    space: Condvar,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

impl BoundedQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }

        Ok(Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            space: Condvar::new(),
            notify: Notify::new(),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            len: self.len(),
        }
    }

    /// Accept one record, applying the overflow policy at capacity. Safe to
    /// call from any thread; blocks only under [`OverflowPolicy::Block`].
    pub fn enqueue(&self, record: NormalizedRecord) -> Result<Enqueued, QueueError> {
        if self.is_closed() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(QueueError::Closed);
        }

        let mut evicted = false;
        let mut inner = self.inner.lock();

        if inner.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return Err(QueueError::Full);
                }
                OverflowPolicy::DropOldest => {
                    inner.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    evicted = true;
                }
                OverflowPolicy::Block { timeout } => {
                    let deadline = std::time::Instant::now() + timeout;
                    while inner.len() >= self.capacity {
                        if self.is_closed() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            return Err(QueueError::Closed);
                        }
                        if self.space.wait_until(&mut inner, deadline).timed_out() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            return Err(QueueError::Timeout);
                        }
                    }
                }
            }
        }

        inner.push_back(record);
        drop(inner);

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();

        Ok(if evicted {
            Enqueued::Evicted
        } else {
            Enqueued::Stored
        })
    }

    /// Pull up to `max_items` records, waiting at most `max_wait` for the
    /// first one. Returns an empty vec on timeout or when the queue is closed
    /// and drained. Single-consumer by contract.
    pub async fn dequeue_batch(
        &self,
        max_items: usize,
        max_wait: Duration,
    ) -> Vec<NormalizedRecord> {
        let deadline = Instant::now() + max_wait;

        loop {
            let drained = self.drain_up_to(max_items);
            if !drained.is_empty() {
                return drained;
            }
            if self.is_closed() {
                return Vec::new();
            }
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                // Deadline hit; one last look in case of a late enqueue.
                return self.drain_up_to(max_items);
            }
        }
    }

    /// Take everything currently queued. Used for the final flush.
    pub fn drain(&self) -> Vec<NormalizedRecord> {
        self.drain_up_to(usize::MAX)
    }

    /// Stop accepting records; pending producers under `Block` fail fast.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.space.notify_all();
        self.notify.notify_one();
    }

    fn drain_up_to(&self, max_items: usize) -> Vec<NormalizedRecord> {
        let mut inner = self.inner.lock();
        let take = inner.len().min(max_items);
        let drained: Vec<NormalizedRecord> = inner.drain(..take).collect();
        drop(inner);

        if !drained.is_empty() {
            self.dequeued.fetch_add(drained.len() as u64, Ordering::Relaxed);
            self.space.notify_all();
        }
        drained
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}
