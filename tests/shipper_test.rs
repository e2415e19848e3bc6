use loki_forwarder::{
    AbandonReason, BatchConfig, Batcher, DeliveryState, EventSink, ForwarderEvent, LabelSet,
    NormalizedRecord, PushPayload, PushSerializer, RetryConfig, Shipper, Transport,
    TransportError, TransportResponse,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum Step {
    Status(u16),
    NetworkError,
    Hang,
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    inner: Arc<ScriptedInner>,
}

#[derive(Default)]
struct ScriptedInner {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    payloads: Mutex<Vec<PushPayload>>,
}

impl ScriptedTransport {
    fn scripted(steps: impl IntoIterator<Item = Step>) -> Self {
        let transport = Self::default();
        transport.inner.script.lock().extend(steps);
        transport
    }

    fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn push(&self, payload: PushPayload) -> Result<TransportResponse, TransportError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.payloads.lock().push(payload);

        let step = self.inner.script.lock().pop_front().unwrap_or(Step::Status(204));
        match step {
            Step::Status(status) => Ok(TransportResponse {
                status,
                body: String::new(),
            }),
            Step::NetworkError => Err(TransportError::Network("connection refused".into())),
            Step::Hang => std::future::pending().await,
        }
    }
}

fn retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        jitter: false,
    }
}

fn sealed_batch(entries: usize) -> loki_forwarder::Batch {
    let mut batcher = Batcher::new(BatchConfig {
        max_batch_size: entries,
        ..Default::default()
    });
    let labels = LabelSet::from([("app", "test")]);
    for n in 0..entries as i64 {
        let sealed = batcher.push(NormalizedRecord {
            timestamp_ns: n,
            labels: labels.clone(),
            line: format!("line {n}"),
        });
        if let Some(batch) = sealed {
            return batch;
        }
    }
    panic!("batch did not seal");
}

fn shipper(transport: ScriptedTransport, retry: RetryConfig) -> Shipper<ScriptedTransport> {
    Shipper::new(transport, PushSerializer::new(false), retry, EventSink::default())
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_takes_three_attempts() {
    let transport =
        ScriptedTransport::scripted([Step::Status(500), Step::Status(500), Step::Status(200)]);
    let shipper = shipper(transport.clone(), retry_config());

    let start = tokio::time::Instant::now();
    let result = shipper
        .ship(sealed_batch(2), &CancellationToken::new(), None)
        .await;

    assert_eq!(result.state, DeliveryState::Succeeded);
    assert_eq!(result.attempts, 3);
    assert_eq!(transport.calls(), 3);
    // Two backoff waits: 100ms after the first failure, 200ms after the second.
    assert_eq!(start.elapsed(), Duration::from_millis(300));

    let stats = shipper.stats();
    assert_eq!(stats.delivered_batches, 1);
    assert_eq!(stats.delivered_records, 2);
    assert_eq!(stats.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_rejection_abandons_immediately() {
    let transport = ScriptedTransport::scripted([Step::Status(400)]);
    let shipper = shipper(transport.clone(), retry_config());

    let result = shipper
        .ship(sealed_batch(1), &CancellationToken::new(), None)
        .await;

    assert_eq!(result.state, DeliveryState::FailedTerminal);
    assert_eq!(result.attempts, 1);
    assert_eq!(transport.calls(), 1);
    assert_eq!(shipper.stats().abandoned_batches, 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_is_retried() {
    let transport = ScriptedTransport::scripted([Step::Status(429), Step::Status(204)]);
    let shipper = shipper(transport.clone(), retry_config());

    let result = shipper
        .ship(sealed_batch(1), &CancellationToken::new(), None)
        .await;

    assert_eq!(result.state, DeliveryState::Succeeded);
    assert_eq!(result.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn network_errors_are_retried() {
    let transport = ScriptedTransport::scripted([Step::NetworkError, Step::Status(204)]);
    let shipper = shipper(transport.clone(), retry_config());

    let result = shipper
        .ship(sealed_batch(1), &CancellationToken::new(), None)
        .await;

    assert_eq!(result.state, DeliveryState::Succeeded);
    assert_eq!(result.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_is_terminal() {
    let transport = ScriptedTransport::scripted(std::iter::repeat(Step::Status(503)).take(10));
    let retry = RetryConfig {
        max_retries: 2,
        ..retry_config()
    };
    let shipper = shipper(transport.clone(), retry);

    let result = shipper
        .ship(sealed_batch(4), &CancellationToken::new(), None)
        .await;

    assert_eq!(result.state, DeliveryState::FailedTerminal);
    // First attempt plus two retries, then the budget is spent.
    assert_eq!(result.attempts, 3);
    assert_eq!(transport.calls(), 3);

    let stats = shipper.stats();
    assert_eq!(stats.abandoned_batches, 1);
    assert_eq!(stats.abandoned_records, 4);
    assert_eq!(stats.delivered_batches, 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let transport = ScriptedTransport::scripted(std::iter::repeat(Step::Status(500)).take(10));
    let shipper = Arc::new(shipper(transport, retry_config()));
    let cancel = CancellationToken::new();

    let task = {
        let shipper = Arc::clone(&shipper);
        let cancel = cancel.clone();
        tokio::spawn(async move { shipper.ship(sealed_batch(1), &cancel, None).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    let result = task.await.unwrap();

    assert_eq!(result.state, DeliveryState::FailedTerminal);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_a_hanging_transport() {
    let transport = ScriptedTransport::scripted([Step::Hang]);
    let shipper = shipper(transport, retry_config());

    let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    let start = tokio::time::Instant::now();
    let result = shipper
        .ship(sealed_batch(1), &CancellationToken::new(), Some(deadline))
        .await;

    assert_eq!(result.state, DeliveryState::FailedTerminal);
    assert_eq!(start.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn abandonment_reason_reaches_the_event_callback() {
    let events: Arc<Mutex<Vec<ForwarderEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = Arc::clone(&events);
        EventSink::new(Some(Arc::new(move |event: &ForwarderEvent| {
            events.lock().push(event.clone());
        })))
    };

    let transport = ScriptedTransport::scripted([Step::Status(404)]);
    let shipper = Shipper::new(
        transport,
        PushSerializer::new(false),
        retry_config(),
        sink,
    );

    shipper
        .ship(sealed_batch(1), &CancellationToken::new(), None)
        .await;

    let events = events.lock();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ForwarderEvent::BatchAbandoned { reason, entries, .. } => {
            assert_eq!(*entries, 1);
            assert!(matches!(reason, AbandonReason::Rejected { status: 404, .. }));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
