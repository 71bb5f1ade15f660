//! Quota limit models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel limit meaning "unlimited".
pub const UNLIMITED: i64 = -1;

/// Mapping from resource-dimension key to an integer limit.
///
/// Ephemeral: built per fulfillment request from billable item
/// quantities, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaSpec(BTreeMap<String, i64>);

impl QuotaSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: i64) {
        self.0.insert(key.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: i64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.0.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Sub-spec of the keys starting with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> QuotaSpec {
        self.iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Sub-spec of exactly the listed keys, where present.
    pub fn with_keys(&self, keys: &[&str]) -> QuotaSpec {
        self.iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Same keys, all limits zeroed.
    pub fn zeroed(&self) -> QuotaSpec {
        self.keys().map(|k| (k.to_string(), 0)).collect()
    }
}

impl FromIterator<(String, i64)> for QuotaSpec {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for QuotaSpec {
    type Item = (String, i64);
    type IntoIter = std::collections::btree_map::IntoIter<String, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Limits and current usage reported by one quota backend.
#[derive(Debug, Clone, Default)]
pub struct QuotaReading {
    pub limits: QuotaSpec,
    pub in_use: QuotaSpec,
}
