use crate::adapter::{LabelSet, NormalizedRecord};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Which threshold sealed a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
    Size,
    Bytes,
    Age,
    /// Sealed below threshold during shutdown.
    Flush,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Seal after this many entries.
    pub max_batch_size: usize,
    /// Seal once accumulated line bytes reach this.
    pub max_batch_bytes: usize,
    /// Seal this long after the first entry of the open batch.
    pub max_batch_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1_000,
            max_batch_bytes: 1024 * 1024,
            max_batch_age: Duration::from_secs(5),
        }
    }
}

/// A sealed group of entries sharing one label set. Immutable after sealing;
/// owned exclusively by the shipper from hand-off on. Entries keep the order
/// records were accepted in.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    label_set: LabelSet,
    entries: Vec<(i64, String)>,
    size_bytes: usize,
    seal_reason: SealReason,
    sealed_at: Instant,
}

impl Batch {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label_set(&self) -> &LabelSet {
        &self.label_set
    }

    /// `(timestamp_ns, line)` pairs in acceptance order.
    pub fn entries(&self) -> &[(i64, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn seal_reason(&self) -> SealReason {
        self.seal_reason
    }

    pub fn sealed_at(&self) -> Instant {
        self.sealed_at
    }
}

#[derive(Debug)]
struct OpenBatch {
    entries: Vec<(i64, String)>,
    size_bytes: usize,
    opened_at: Instant,
}

impl OpenBatch {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            size_bytes: 0,
            opened_at: Instant::now(),
        }
    }

    fn seal(self, label_set: LabelSet, reason: SealReason) -> Batch {
        Batch {
            id: Uuid::new_v4().to_string(),
            label_set,
            entries: self.entries,
            size_bytes: self.size_bytes,
            seal_reason: reason,
            sealed_at: Instant::now(),
        }
    }
}

/// Accumulates records into per-label-set batches, sealing on whichever of
/// the size, byte, or age thresholds crosses first.
///
/// Exclusively owned by the worker task; no internal locking.
#[derive(Debug)]
pub struct Batcher {
    config: BatchConfig,
    open: HashMap<LabelSet, OpenBatch>,
}

impl Batcher {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            open: HashMap::new(),
        }
    }

    /// Add one record; returns the sealed batch if this record crossed the
    /// size or byte threshold.
    pub fn push(&mut self, record: NormalizedRecord) -> Option<Batch> {
        let NormalizedRecord {
            timestamp_ns,
            labels,
            line,
        } = record;

        let entry_bytes = line.len();
        let open = self.open.entry(labels.clone()).or_insert_with(OpenBatch::new);
        open.entries.push((timestamp_ns, line));
        open.size_bytes += entry_bytes;

        let reason = if open.entries.len() >= self.config.max_batch_size {
            SealReason::Size
        } else if open.size_bytes >= self.config.max_batch_bytes {
            SealReason::Bytes
        } else {
            return None;
        };

        self.open
            .remove(&labels)
            .map(|open| open.seal(labels, reason))
    }

    /// Seal every open batch older than `max_batch_age`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Batch> {
        let max_age = self.config.max_batch_age;
        let expired: Vec<LabelSet> = self
            .open
            .iter()
            .filter(|(_, open)| {
                open.opened_at
                    .checked_add(max_age)
                    .is_some_and(|deadline| deadline <= now)
            })
            .map(|(labels, _)| labels.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|labels| {
                self.open
                    .remove(&labels)
                    .map(|open| open.seal(labels, SealReason::Age))
            })
            .collect()
    }

    /// Earliest instant at which an open batch will expire, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.open
            .values()
            .filter_map(|open| open.opened_at.checked_add(self.config.max_batch_age))
            .min()
    }

    /// Seal everything regardless of thresholds (final flush).
    pub fn flush_all(&mut self) -> Vec<Batch> {
        self.open
            .drain()
            .filter(|(_, open)| !open.entries.is_empty())
            .map(|(labels, open)| open.seal(labels, SealReason::Flush))
            .collect()
    }

    /// Records currently held in open batches.
    pub fn open_records(&self) -> usize {
        self.open.values().map(|open| open.entries.len()).sum()
    }

    pub fn open_streams(&self) -> usize {
        self.open.len()
    }
}
