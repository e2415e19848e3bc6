//! Batch delivery with retry, backoff, and outcome classification.

pub mod retry;

pub use retry::RetryConfig;

use crate::buffer::Batch;
use crate::events::{AbandonReason, EventSink, ForwarderEvent};
use crate::sender::{PushSerializer, Transport};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-batch delivery state machine. `Succeeded` and `FailedTerminal` are
/// terminal; `FailedRetryable` returns to `Pending` after the backoff wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    InFlight,
    Succeeded,
    FailedRetryable,
    FailedTerminal,
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Succeeded | DeliveryState::FailedTerminal)
    }
}

/// Classification of one transport outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Retryable,
    Terminal,
}

/// Map an HTTP status to a delivery outcome: 2xx succeeds, 429 and 5xx are
/// worth retrying, anything else will not get better on its own.
pub fn classify_status(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Success,
        429 => Outcome::Retryable,
        500..=599 => Outcome::Retryable,
        _ => Outcome::Terminal,
    }
}

/// One attempt's outcome, with the abandon reason attached when terminal.
#[derive(Debug)]
enum AttemptOutcome {
    Success,
    Retryable,
    Terminal(AbandonReason),
}

#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub batch_id: String,
    pub state: DeliveryState,
    pub attempts: u32,
    pub entries: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShipperStats {
    pub delivered_batches: u64,
    pub delivered_records: u64,
    pub abandoned_batches: u64,
    pub abandoned_records: u64,
    pub attempts: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    delivered_batches: AtomicU64,
    delivered_records: AtomicU64,
    abandoned_batches: AtomicU64,
    abandoned_records: AtomicU64,
    attempts: AtomicU64,
}

/// Delivers sealed batches through the injected [`Transport`].
///
/// One shipper serves one worker; calls to [`Shipper::ship`] are serialized
/// by that worker, which is what preserves per-stream batch order.
pub struct Shipper<T: Transport> {
    transport: T,
    serializer: PushSerializer,
    retry: RetryConfig,
    events: EventSink,
    stats: StatsCounters,
}

impl<T: Transport> Shipper<T> {
    pub fn new(transport: T, serializer: PushSerializer, retry: RetryConfig, events: EventSink) -> Self {
        Self {
            transport,
            serializer,
            retry,
            events,
            stats: StatsCounters::default(),
        }
    }

    pub fn stats(&self) -> ShipperStats {
        ShipperStats {
            delivered_batches: self.stats.delivered_batches.load(Ordering::Relaxed),
            delivered_records: self.stats.delivered_records.load(Ordering::Relaxed),
            abandoned_batches: self.stats.abandoned_batches.load(Ordering::Relaxed),
            abandoned_records: self.stats.abandoned_records.load(Ordering::Relaxed),
            attempts: self.stats.attempts.load(Ordering::Relaxed),
        }
    }

    /// Deliver one batch, retrying with exponential backoff until it reaches
    /// a terminal state, the token is cancelled, or the deadline passes.
    pub async fn ship(
        &self,
        batch: Batch,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> DeliveryResult {
        let batch_id = batch.id().to_string();
        let entries = batch.len();

        let payload = match self.serializer.serialize(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(batch_id, error = %e, "batch cannot be serialized");
                return self.abandon(batch_id, entries, 0, AbandonReason::Serialization);
            }
        };

        let mut state = DeliveryState::Pending;
        let mut attempts = 0u32;

        while !state.is_terminal() {
            state = DeliveryState::InFlight;
            attempts += 1;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);
            debug!(batch_id, attempt = attempts, state = ?state, "pushing batch");

            let push = self.transport.push(payload.clone());
            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    return self.abandon(batch_id, entries, attempts, AbandonReason::ShutdownExpired);
                }
                response = with_deadline(deadline, push) => match response {
                    Some(response) => response,
                    None => {
                        return self.abandon(batch_id, entries, attempts, AbandonReason::ShutdownExpired);
                    }
                },
            };

            let outcome = match response {
                Ok(response) => match classify_status(response.status) {
                    Outcome::Success => AttemptOutcome::Success,
                    Outcome::Terminal => AttemptOutcome::Terminal(AbandonReason::Rejected {
                        status: response.status,
                        body: response.body,
                    }),
                    Outcome::Retryable => {
                        warn!(batch_id, status = response.status, "push rejected, will retry");
                        AttemptOutcome::Retryable
                    }
                },
                Err(e) => {
                    warn!(batch_id, error = %e, "push failed, will retry");
                    AttemptOutcome::Retryable
                }
            };

            match outcome {
                AttemptOutcome::Success => {
                    state = DeliveryState::Succeeded;
                    self.stats.delivered_batches.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .delivered_records
                        .fetch_add(entries as u64, Ordering::Relaxed);
                    self.events.emit(ForwarderEvent::BatchDelivered {
                        batch_id: batch_id.clone(),
                        entries,
                        attempts,
                    });
                }
                AttemptOutcome::Terminal(reason) => {
                    return self.abandon(batch_id, entries, attempts, reason);
                }
                AttemptOutcome::Retryable => {
                    if attempts > self.retry.max_retries {
                        return self.abandon(
                            batch_id,
                            entries,
                            attempts,
                            AbandonReason::RetriesExhausted,
                        );
                    }

                    state = DeliveryState::FailedRetryable;
                    let delay = self.retry.delay_for(attempts);
                    debug!(batch_id, attempts, ?delay, state = ?state, "delivery failed, backing off");

                    let slept = tokio::select! {
                        _ = cancel.cancelled() => None,
                        slept = with_deadline(deadline, sleep(delay)) => slept,
                    };
                    if slept.is_none() {
                        return self.abandon(
                            batch_id,
                            entries,
                            attempts,
                            AbandonReason::ShutdownExpired,
                        );
                    }
                    state = DeliveryState::Pending;
                }
            }
        }

        DeliveryResult {
            batch_id,
            state,
            attempts,
            entries,
        }
    }

    fn abandon(
        &self,
        batch_id: String,
        entries: usize,
        attempts: u32,
        reason: AbandonReason,
    ) -> DeliveryResult {
        self.stats.abandoned_batches.fetch_add(1, Ordering::Relaxed);
        self.stats
            .abandoned_records
            .fetch_add(entries as u64, Ordering::Relaxed);
        self.events.emit(ForwarderEvent::BatchAbandoned {
            batch_id: batch_id.clone(),
            entries,
            attempts,
            reason,
        });

        DeliveryResult {
            batch_id,
            state: DeliveryState::FailedTerminal,
            attempts,
            entries,
        }
    }
}

async fn with_deadline<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(at) => timeout_at(at, future).await.ok(),
        None => Some(future.await),
    }
}
