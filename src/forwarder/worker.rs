use crate::buffer::{Batch, Batcher, BoundedQueue};
use crate::events::{AbandonReason, EventSink, ForwarderEvent};
use crate::sender::Transport;
use crate::shipper::{DeliveryState, Shipper};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WorkerReport {
    pub delivered_records: u64,
    pub undelivered_records: u64,
    pub forced: bool,
}

/// The single background task owning the Batcher-to-Shipper pipeline.
///
/// Deliveries run inline on this task, so batches of every label set go out
/// in seal order; that is the per-stream ordering guarantee.
pub(crate) struct Worker<T: Transport> {
    queue: Arc<BoundedQueue>,
    batcher: Batcher,
    shipper: Shipper<T>,
    events: EventSink,
    drain: CancellationToken,
    force: CancellationToken,
    shutdown_grace: Duration,
    dequeue_chunk: usize,
    poll_interval: Duration,
    delivered_records: u64,
    undelivered_records: u64,
}

impl<T: Transport> Worker<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queue: Arc<BoundedQueue>,
        batcher: Batcher,
        shipper: Shipper<T>,
        events: EventSink,
        drain: CancellationToken,
        force: CancellationToken,
        shutdown_grace: Duration,
        dequeue_chunk: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            batcher,
            shipper,
            events,
            drain,
            force,
            shutdown_grace,
            dequeue_chunk,
            poll_interval,
            delivered_records: 0,
            undelivered_records: 0,
        }
    }

    pub(crate) async fn run(mut self) -> WorkerReport {
        debug!("shipping worker started");

        loop {
            let wait = self.wait_bound();
            let records = tokio::select! {
                _ = self.drain.cancelled() => break,
                records = self.queue.dequeue_batch(self.dequeue_chunk, wait) => records,
            };

            for record in records {
                if let Some(batch) = self.batcher.push(record) {
                    self.deliver(batch, None).await;
                }
            }
            for batch in self.batcher.take_expired(Instant::now()) {
                self.deliver(batch, None).await;
            }
        }

        self.final_flush().await
    }

    /// Upper bound for the next queue wait: the earliest open-batch age
    /// deadline, capped by the poll interval.
    fn wait_bound(&self) -> Duration {
        match self.batcher.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.poll_interval),
            None => self.poll_interval,
        }
    }

    async fn deliver(&mut self, batch: Batch, deadline: Option<Instant>) {
        let entries = batch.len() as u64;
        let result = self.shipper.ship(batch, &self.force, deadline).await;
        match result.state {
            DeliveryState::Succeeded => self.delivered_records += entries,
            _ => self.undelivered_records += entries,
        }
    }

    /// Seal and ship everything still buffered, bounded by the grace period.
    async fn final_flush(mut self) -> WorkerReport {
        let deadline = Instant::now() + self.shutdown_grace;
        let grace_timer = {
            let force = self.force.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                force.cancel();
            })
        };

        for record in self.queue.drain() {
            if let Some(batch) = self.batcher.push(record) {
                self.deliver(batch, Some(deadline)).await;
            }
        }

        for batch in self.batcher.flush_all() {
            if self.force.is_cancelled() {
                self.undelivered_records += batch.len() as u64;
                self.events.emit(ForwarderEvent::BatchAbandoned {
                    batch_id: batch.id().to_string(),
                    entries: batch.len(),
                    attempts: 0,
                    reason: AbandonReason::ShutdownExpired,
                });
                continue;
            }
            self.deliver(batch, Some(deadline)).await;
        }

        grace_timer.abort();
        // The timer task may not have been polled yet; check the clock too.
        let forced = self.force.is_cancelled() || Instant::now() >= deadline;
        if forced {
            self.events.emit(ForwarderEvent::ShutdownForced {
                undelivered: self.undelivered_records,
            });
        }

        info!(
            delivered = self.delivered_records,
            undelivered = self.undelivered_records,
            forced,
            "shipping worker stopped"
        );

        WorkerReport {
            delivered_records: self.delivered_records,
            undelivered_records: self.undelivered_records,
            forced,
        }
    }
}
