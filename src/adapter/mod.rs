//! Conversion of application log events into normalized records.
//!
//! The adapter is the only place that touches caller-supplied data, so it must
//! never fail: malformed extra fields are coerced or tagged, never propagated.

mod record;

pub use record::{LabelSet, NormalizedRecord};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Label carrying the record's level, matching what Loki dashboards key on.
pub const SEVERITY_LABEL: &str = "severity";

/// Label attached when an extra field could not be coerced to a string.
pub const ERROR_LABEL: &str = "_error";

/// Label carrying the machine hostname when enabled.
pub const HOST_LABEL: &str = "host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds [`NormalizedRecord`]s from raw log calls.
///
/// Static default labels are injected at construction and merged into every
/// record; there is no ambient global state.
#[derive(Debug, Clone)]
pub struct RecordAdapter {
    default_labels: LabelSet,
}

impl RecordAdapter {
    pub fn new(default_labels: LabelSet) -> Self {
        Self { default_labels }
    }

    /// Add a `host` label from the machine hostname unless the caller already
    /// set one.
    pub fn with_hostname_label(mut self) -> Self {
        if !self.default_labels.contains_key(HOST_LABEL) {
            if let Ok(name) = hostname::get() {
                self.default_labels
                    .insert(HOST_LABEL, name.to_string_lossy().into_owned());
            }
        }
        self
    }

    pub fn default_labels(&self) -> &LabelSet {
        &self.default_labels
    }

    /// Normalize one log call. Infallible by contract: coercion failure yields
    /// a record tagged with [`ERROR_LABEL`] instead of an error.
    pub fn adapt(
        &self,
        level: Level,
        message: &str,
        timestamp: DateTime<Utc>,
        extra_fields: &HashMap<String, Value>,
    ) -> NormalizedRecord {
        let timestamp_ns = timestamp_nanos(timestamp);

        let mut labels = self.default_labels.clone();
        labels.insert(SEVERITY_LABEL, level.as_str());

        for (key, value) in extra_fields {
            match coerce_value(value) {
                Ok(coerced) => labels.insert(sanitize_label_key(key), coerced),
                Err(_) => {
                    let mut labels = self.default_labels.clone();
                    labels.insert(SEVERITY_LABEL, level.as_str());
                    labels.insert(ERROR_LABEL, sanitize_label_key(key));
                    return NormalizedRecord {
                        timestamp_ns,
                        labels,
                        line: format!("{value:?}"),
                    };
                }
            }
        }

        NormalizedRecord {
            timestamp_ns,
            labels,
            line: message.to_string(),
        }
    }
}

fn timestamp_nanos(timestamp: DateTime<Utc>) -> i64 {
    // Out-of-range dates (beyond ~2262) fall back to millisecond precision.
    timestamp
        .timestamp_nanos_opt()
        .unwrap_or_else(|| timestamp.timestamp_millis().saturating_mul(1_000_000))
}

fn coerce_value(value: &Value) -> Result<String, serde_json::Error> {
    // to_string on a Value cannot fail today; the Err arm in adapt keeps the
    // never-raise contract should a fallible coercion be added.
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => serde_json::to_string(other),
    }
}

/// Force a key into Loki's label grammar `[a-zA-Z_][a-zA-Z0-9_]*`.
fn sanitize_label_key(key: &str) -> String {
    let mut sanitized = String::with_capacity(key.len().max(1));
    for (i, c) in key.chars().enumerate() {
        let valid = c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit());
        sanitized.push(if valid { c } else { '_' });
    }
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    sanitized
}
