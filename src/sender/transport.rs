use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

/// A serialized push request ready for the wire.
#[derive(Debug, Clone)]
pub struct PushPayload {
    pub body: Bytes,
    pub compressed: bool,
}

/// What came back from a push call. Only the status code drives delivery
/// classification; the body is kept (truncated) for terminal error reporting.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Injected HTTP collaborator: POSTs one payload to the configured endpoint.
///
/// Implementations must be cheap to call concurrently; TLS and auth are their
/// concern, not the shipper's.
pub trait Transport: Send + Sync + 'static {
    fn push(
        &self,
        payload: PushPayload,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}
