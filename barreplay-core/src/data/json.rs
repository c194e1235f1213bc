//! JSON record files: a top-level array of rows, or `{"data": [...]}`.

use super::source::{ensure_exists, BarSource, RawRecord, SourceError, TextRecord};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSource;

impl BarSource for JsonSource {
    fn name(&self) -> &str {
        "json"
    }

    fn read_records(&self, _symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError> {
        ensure_exists(path)?;
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_records(&text).map_err(|reason| SourceError::Decode {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Decode a JSON document into raw rows.
pub fn parse_records(text: &str) -> Result<Vec<RawRecord>, String> {
    let document: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let rows = match document {
        serde_json::Value::Array(rows) => rows,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(rows)) => rows,
            _ => return Err("document must contain a list of records".into()),
        },
        _ => return Err("document must contain a list of records".into()),
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value::<TextRecord>(row)
                .map(RawRecord::from)
                .map_err(|e| format!("record {i}: {e}"))
        })
        .collect()
}
