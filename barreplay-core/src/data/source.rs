//! Bar source trait and structured error types.
//!
//! The BarSource trait abstracts over record encodings (JSON, CSV, Parquet,
//! in-memory) so the loader never depends on how rows are stored on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Timestamp as it came out of the source: text to be parsed, or an instant
/// already decoded by a typed backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Text(String),
    Instant(DateTime<Utc>),
}

/// One undecoded row. Required fields are optional here so that the loader,
/// not the backend, decides what a malformed record is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRecord {
    pub ts: Option<RawTimestamp>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawRecord {
    /// Fully populated row with a textual timestamp.
    pub fn new(ts: &str, open: f64, high: f64, low: f64, close: f64, volume: Option<f64>) -> Self {
        Self {
            ts: Some(RawTimestamp::Text(ts.to_string())),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(close),
            volume,
        }
    }
}

/// Row shape shared by the text backends (JSON and CSV).
#[derive(Debug, Deserialize)]
pub(crate) struct TextRecord {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

impl From<TextRecord> for RawRecord {
    fn from(row: TextRecord) -> Self {
        Self {
            ts: row.ts.map(RawTimestamp::Text),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

/// Errors from reading a record source. All of them are fatal for a replay.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("parquet I/O error in {}: {reason}", path.display())]
    Parquet { path: PathBuf, reason: String },
}

/// Capability: read one symbol's raw records from a path.
///
/// Implementations are encoding-specific; session filtering, ordering and
/// integrity checks all happen above this trait.
pub trait BarSource: Send + Sync {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Read every record stored at `path` for `symbol`, in stored order.
    fn read_records(&self, symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError>;
}

pub(crate) fn ensure_exists(path: &Path) -> Result<(), SourceError> {
    if path.exists() {
        Ok(())
    } else {
        Err(SourceError::NotFound(path.to_path_buf()))
    }
}

/// Rows registered in memory under a path key.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    rows: HashMap<PathBuf, Vec<RawRecord>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, records: Vec<RawRecord>) {
        self.rows.insert(path.into(), records);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, records: Vec<RawRecord>) -> Self {
        self.insert(path, records);
        self
    }
}

impl BarSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn read_records(&self, _symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError> {
        self.rows
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_path_buf()))
    }
}
