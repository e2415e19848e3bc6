//! Buffered, asynchronous forwarding of application log records to a Grafana
//! Loki push endpoint.
//!
//! Application threads call [`Forwarder::log`]; records flow through a bounded
//! queue into a single background task that batches them per label set and
//! ships each batch over HTTP with retry and exponential backoff. Delivery
//! failures never propagate back into the log call: they are counted and
//! reported through an event callback or tracing.
//!
//! ```no_run
//! use loki_forwarder::{Forwarder, ForwarderConfig, LabelSet, Level};
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), loki_forwarder::ConfigError> {
//! let mut config = ForwarderConfig::new("http://localhost:3100/loki/api/v1/push");
//! config.default_labels = LabelSet::from([("app", "payments")]);
//!
//! let forwarder = Forwarder::spawn(config)?;
//! forwarder.log_now(Level::Info, "checkout complete", &HashMap::new());
//!
//! let report = forwarder.shutdown().await;
//! assert_eq!(report.undelivered_records, 0);
//! # Ok(())
//! # }
//! ```

#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod events;
pub mod forwarder;
pub mod sender;
pub mod shipper;

pub use adapter::{LabelSet, Level, NormalizedRecord, RecordAdapter};
pub use buffer::{
    Batch, BatchConfig, Batcher, BoundedQueue, Enqueued, OverflowPolicy, QueueError, QueueStats,
    SealReason,
};
pub use config::{ConfigError, ForwarderConfig};
pub use events::{AbandonReason, DropReason, EventCallback, EventSink, ForwarderEvent};
pub use forwarder::{Forwarder, ShutdownReport};
pub use sender::{
    Auth, HttpTransport, HttpTransportConfig, PushPayload, PushSerializer, Transport,
    TransportError, TransportResponse,
};
pub use shipper::{DeliveryResult, DeliveryState, RetryConfig, Shipper};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
