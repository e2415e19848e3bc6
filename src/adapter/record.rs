use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable, order-irrelevant set of key/value string pairs identifying a
/// logical log stream. Equality and hashing define batch grouping, so the
/// backing map is sorted: two sets built in different insertion orders
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Merge `other` into a copy of `self`; keys in `other` win.
    pub fn merged_with(&self, other: &LabelSet) -> LabelSet {
        let mut merged = self.0.clone();
        for (k, v) in &other.0 {
            merged.insert(k.clone(), v.clone());
        }
        LabelSet(merged)
    }
}

impl FromIterator<(String, String)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for LabelSet {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// A single log event normalized for shipping: nanosecond timestamp, the
/// stream labels it belongs to, and the rendered line. Immutable once built;
/// owned by the queue until the worker dequeues it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub timestamp_ns: i64,
    pub labels: LabelSet,
    pub line: String,
}

impl NormalizedRecord {
    /// Wire-size estimate used for batch byte accounting.
    pub fn size_bytes(&self) -> usize {
        self.line.len()
    }
}
