//! Extension-dispatching file backend.

use super::csv_source::CsvSource;
use super::json::JsonSource;
use super::parquet::ParquetSource;
use super::source::{BarSource, RawRecord, SourceError};
use std::path::Path;

/// Picks a decoder from the file extension: `.parquet`, `.csv`, anything else as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl FileSource {
    fn backend_for(path: &Path) -> &'static dyn BarSource {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("parquet") | Some("pq") => &ParquetSource,
            Some("csv") => &CsvSource,
            _ => &JsonSource,
        }
    }
}

impl BarSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn read_records(&self, symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError> {
        Self::backend_for(path).read_records(symbol, path)
    }
}
