//! The application-facing surface: spawn, log, shut down.

mod worker;

use crate::adapter::{Level, RecordAdapter};
use crate::buffer::{Batcher, BoundedQueue, Enqueued, QueueError, QueueStats};
use crate::config::{ConfigError, ForwarderConfig};
use crate::events::{DropReason, EventCallback, EventSink, ForwarderEvent};
use crate::sender::{HttpTransport, PushSerializer, Transport};
use crate::shipper::Shipper;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use worker::{Worker, WorkerReport};

/// Final accounting returned by [`Forwarder::shutdown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownReport {
    /// Records confirmed delivered over the forwarder's lifetime.
    pub delivered_records: u64,
    /// Records accepted into the queue but never delivered (terminal
    /// rejections, exhausted retries, or grace-period expiry).
    pub undelivered_records: u64,
    /// Records dropped before acceptance (overflow policy or post-shutdown).
    pub dropped_records: u64,
    /// True when the grace period expired with work remaining.
    pub forced: bool,
}

/// Buffered, asynchronous bridge from application log calls to a Loki push
/// endpoint.
///
/// [`Forwarder::log`] never blocks beyond the configured overflow policy and
/// never surfaces delivery failures; those arrive through the event callback
/// or tracing. Must be created inside a tokio runtime.
pub struct Forwarder {
    adapter: RecordAdapter,
    queue: Arc<BoundedQueue>,
    events: EventSink,
    drain: CancellationToken,
    force: CancellationToken,
    shutdown_grace: std::time::Duration,
    worker: JoinHandle<WorkerReport>,
}

impl Forwarder {
    /// Spawn with the default reqwest-backed transport.
    pub fn spawn(config: ForwarderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = HttpTransport::new(config.transport.clone())
            .map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;
        Self::spawn_inner(config, transport, EventSink::default())
    }

    /// Spawn with an injected transport (tests, alternative clients).
    pub fn spawn_with_transport<T: Transport>(
        config: ForwarderConfig,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::spawn_inner(config, transport, EventSink::default())
    }

    /// Spawn with an injected transport and an event callback receiving
    /// drops, deliveries, and abandonments.
    pub fn spawn_with_events<T: Transport>(
        config: ForwarderConfig,
        transport: T,
        callback: EventCallback,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::spawn_inner(config, transport, EventSink::new(Some(callback)))
    }

    fn spawn_inner<T: Transport>(
        config: ForwarderConfig,
        transport: T,
        events: EventSink,
    ) -> Result<Self, ConfigError> {
        let mut adapter = RecordAdapter::new(config.default_labels.clone());
        if config.hostname_label {
            adapter = adapter.with_hostname_label();
        }

        let queue = Arc::new(
            BoundedQueue::new(config.queue_capacity, config.overflow_policy)
                .map_err(|_| ConfigError::ZeroQueueCapacity)?,
        );

        let shipper = Shipper::new(
            transport,
            PushSerializer::new(config.compression),
            config.retry.clone(),
            events.clone(),
        );

        let drain = CancellationToken::new();
        let force = CancellationToken::new();
        let worker = Worker::new(
            Arc::clone(&queue),
            Batcher::new(config.batch.clone()),
            shipper,
            events.clone(),
            drain.clone(),
            force.clone(),
            config.shutdown_grace,
            config.dequeue_chunk,
            config.poll_interval,
        );

        info!(
            endpoint = %config.transport.endpoint,
            capacity = config.queue_capacity,
            "forwarder started"
        );

        Ok(Self {
            adapter,
            queue,
            events,
            drain,
            force,
            shutdown_grace: config.shutdown_grace,
            worker: tokio::spawn(worker.run()),
        })
    }

    /// Hand one log event to the forwarder. Returns immediately (bounded wait
    /// only under the `Block` policy); `false` means the record was not
    /// accepted. Never panics and never surfaces delivery failures.
    pub fn log(
        &self,
        level: Level,
        message: &str,
        timestamp: DateTime<Utc>,
        extra_fields: &HashMap<String, Value>,
    ) -> bool {
        let record = self.adapter.adapt(level, message, timestamp, extra_fields);

        match self.queue.enqueue(record) {
            Ok(Enqueued::Stored) => true,
            Ok(Enqueued::Evicted) => {
                self.events.emit(ForwarderEvent::RecordsDropped {
                    count: 1,
                    reason: DropReason::QueueFull,
                });
                true
            }
            Err(e) => {
                let reason = match e {
                    QueueError::Timeout => DropReason::EnqueueTimeout,
                    QueueError::Closed => DropReason::Shutdown,
                    QueueError::Full | QueueError::InvalidCapacity => DropReason::QueueFull,
                };
                self.events.emit(ForwarderEvent::RecordsDropped { count: 1, reason });
                false
            }
        }
    }

    /// [`Forwarder::log`] stamped with the current wall clock.
    pub fn log_now(
        &self,
        level: Level,
        message: &str,
        extra_fields: &HashMap<String, Value>,
    ) -> bool {
        self.log(level, message, Utc::now(), extra_fields)
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Stop accepting records, flush what is buffered within the grace
    /// period, and report the final accounting.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("forwarder shutdown requested");
        self.queue.close();
        self.drain.cancel();

        // The grace window is measured from the shutdown request, so a
        // delivery already stuck in a retry loop cannot stall it.
        let force = self.force.clone();
        let grace = self.shutdown_grace;
        let grace_timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            force.cancel();
        });

        let report = match self.worker.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "shipping worker did not stop cleanly");
                WorkerReport {
                    forced: true,
                    ..Default::default()
                }
            }
        };

        grace_timer.abort();

        ShutdownReport {
            delivered_records: report.delivered_records,
            undelivered_records: report.undelivered_records,
            dropped_records: self.queue.stats().dropped,
            forced: report.forced,
        }
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("queue", &self.queue)
            .field("default_labels", self.adapter.default_labels())
            .finish()
    }
}
