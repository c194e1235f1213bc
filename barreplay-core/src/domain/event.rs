//! Non-bar payloads: integrity/lifecycle events and heartbeats.

use super::time::utc_z;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Closed set of operations event codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpsCode {
    Gap,
    Duplicate,
    OutOfOrder,
    ClockDrift,
    ProviderError,
    SessionClose,
}

impl OpsCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpsCode::Gap => "GAP",
            OpsCode::Duplicate => "DUPLICATE",
            OpsCode::OutOfOrder => "OUT_OF_ORDER",
            OpsCode::ClockDrift => "CLOCK_DRIFT",
            OpsCode::ProviderError => "PROVIDER_ERROR",
            OpsCode::SessionClose => "SESSION_CLOSE",
        }
    }

    /// Data-quality codes raised by the loader (as opposed to lifecycle/provider codes).
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            OpsCode::Gap | OpsCode::Duplicate | OpsCode::OutOfOrder | OpsCode::ClockDrift
        )
    }
}

impl fmt::Display for OpsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data-quality or lifecycle signal. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsEvent {
    #[serde(with = "utc_z")]
    pub ts: DateTime<Utc>,
    pub code: OpsCode,
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OpsEvent {
    pub fn new(ts: DateTime<Utc>, code: OpsCode, message: impl Into<String>) -> Self {
        Self {
            ts,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

/// Liveness signal carrying the latest sequence number per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthHeartbeat {
    #[serde(with = "utc_z")]
    pub ts: DateTime<Utc>,
    pub seq_per_symbol: BTreeMap<String, u64>,
}
