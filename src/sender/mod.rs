//! Wire concerns: the transport boundary, the default HTTP client, and the
//! Loki push payload serializer.

pub mod client;
pub mod serialization;
pub mod transport;

pub use client::{Auth, HttpTransport, HttpTransportConfig};
pub use serialization::{PushSerializer, SerializationError};
pub use transport::{PushPayload, Transport, TransportError, TransportResponse};
