use crate::adapter::LabelSet;
use crate::buffer::{BatchConfig, OverflowPolicy};
use crate::sender::HttpTransportConfig;
use crate::shipper::RetryConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    #[error("queue capacity must be non-zero")]
    ZeroQueueCapacity,
    #[error("batch thresholds must be non-zero")]
    ZeroBatchThreshold,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the forwarder consumes at construction. Values are injected by
/// the embedding application; this crate does not read files or environment,
/// but the whole surface deserializes so embedders can.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub transport: HttpTransportConfig,
    /// Gzip push bodies.
    pub compression: bool,
    /// Static labels merged into every record.
    pub default_labels: LabelSet,
    /// Add a `host` label from the machine hostname.
    pub hostname_label: bool,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    /// How long shutdown waits for the final flush before force-stopping.
    pub shutdown_grace: Duration,
    /// Records the worker pulls from the queue per wakeup.
    pub dequeue_chunk: usize,
    /// Upper bound on the worker's idle wait.
    pub poll_interval: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            transport: HttpTransportConfig::default(),
            compression: false,
            default_labels: LabelSet::new(),
            hostname_label: true,
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::default(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            shutdown_grace: Duration::from_secs(5),
            dequeue_chunk: 512,
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl ForwarderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            transport: HttpTransportConfig {
                endpoint: endpoint.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url: Url = self
            .transport
            .endpoint
            .parse()
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {e}", self.transport.endpoint)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.batch.max_batch_size == 0
            || self.batch.max_batch_bytes == 0
            || self.batch.max_batch_age.is_zero()
        {
            return Err(ConfigError::ZeroBatchThreshold);
        }
        if self.dequeue_chunk == 0 {
            return Err(ConfigError::Invalid("dequeue_chunk must be non-zero".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be non-zero".into()));
        }
        if let OverflowPolicy::Block { timeout } = self.overflow_policy {
            if timeout.is_zero() {
                return Err(ConfigError::Invalid(
                    "block timeout must be non-zero".into(),
                ));
            }
        }

        Ok(())
    }
}
