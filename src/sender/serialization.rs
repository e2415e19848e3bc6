use super::transport::PushPayload;
use crate::buffer::Batch;
use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("compression failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("batch is empty")]
    EmptyBatch,
}

/// Loki push request: `{"streams":[{"stream":{...},"values":[[ts,line],..]}]}`.
/// Timestamps go on the wire as nanosecond strings.
#[derive(Serialize)]
struct PushRequest<'a> {
    streams: Vec<PushStream<'a>>,
}

#[derive(Serialize)]
struct PushStream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

/// Turns sealed batches into wire payloads, optionally gzipped.
#[derive(Debug, Clone)]
pub struct PushSerializer {
    compress: bool,
}

impl PushSerializer {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn serialize(&self, batch: &Batch) -> Result<PushPayload, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let values = batch
            .entries()
            .iter()
            .map(|(timestamp_ns, line)| [timestamp_ns.to_string(), line.clone()])
            .collect();

        let request = PushRequest {
            streams: vec![PushStream {
                stream: batch.label_set().as_map(),
                values,
            }],
        };

        let json = serde_json::to_vec(&request)?;

        if self.compress {
            let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::fast());
            encoder.write_all(&json)?;
            let compressed = encoder.finish()?;
            Ok(PushPayload {
                body: Bytes::from(compressed),
                compressed: true,
            })
        } else {
            Ok(PushPayload {
                body: Bytes::from(json),
                compressed: false,
            })
        }
    }
}

impl Default for PushSerializer {
    fn default() -> Self {
        Self::new(false)
    }
}
