//! Headered CSV record files: `ts,open,high,low,close[,volume]`.

use super::source::{ensure_exists, BarSource, RawRecord, SourceError, TextRecord};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvSource;

impl BarSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn read_records(&self, _symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError> {
        ensure_exists(path)?;
        let file = std::fs::File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_records(file).map_err(|reason| SourceError::Decode {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Decode CSV rows from any reader. Empty cells decode as missing values.
pub fn parse_records<R: Read>(input: R) -> Result<Vec<RawRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    reader
        .deserialize::<TextRecord>()
        .enumerate()
        .map(|(i, row)| {
            row.map(RawRecord::from)
                .map_err(|e| format!("record {i}: {e}"))
        })
        .collect()
}
