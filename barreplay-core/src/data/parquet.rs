//! Columnar record files read through polars.
//!
//! The `ts` column may be stored as text or as a datetime of any unit.
//! Price and volume columns are cast to f64; a missing column reads as nulls
//! and is rejected (or tolerated, for volume) by the loader.

use super::source::{ensure_exists, BarSource, RawRecord, RawTimestamp, SourceError};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetSource;

impl BarSource for ParquetSource {
    fn name(&self) -> &str {
        "parquet"
    }

    fn read_records(&self, _symbol: &str, path: &Path) -> Result<Vec<RawRecord>, SourceError> {
        ensure_exists(path)?;
        let parquet_err = |reason: String| SourceError::Parquet {
            path: path.to_path_buf(),
            reason,
        };
        let file = fs::File::open(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| parquet_err(format!("read: {e}")))?;
        dataframe_to_records(&df).map_err(parquet_err)
    }
}

/// Convert a DataFrame into raw rows, preserving row order.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<RawRecord>, String> {
    let timestamps = timestamp_column(df)?;
    let opens = float_column(df, "open")?;
    let highs = float_column(df, "high")?;
    let lows = float_column(df, "low")?;
    let closes = float_column(df, "close")?;
    let volumes = float_column(df, "volume")?;

    Ok((0..df.height())
        .map(|i| RawRecord {
            ts: timestamps[i].clone(),
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
        })
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, String> {
    let Ok(column) = df.column(name) else {
        return Ok(vec![None; df.height()]);
    };
    let cast = column
        .cast(&DataType::Float64)
        .map_err(|e| format!("{name} column cast: {e}"))?;
    let values = cast
        .f64()
        .map_err(|e| format!("{name} column type: {e}"))?;
    Ok(values.into_iter().collect())
}

fn timestamp_column(df: &DataFrame) -> Result<Vec<Option<RawTimestamp>>, String> {
    let Ok(column) = df.column("ts") else {
        return Ok(vec![None; df.height()]);
    };
    match column.dtype() {
        DataType::String => {
            let values = column.str().map_err(|e| format!("ts column type: {e}"))?;
            Ok(values
                .into_iter()
                .map(|v| v.map(|text| RawTimestamp::Text(text.to_string())))
                .collect())
        }
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = column
                .cast(&DataType::Int64)
                .map_err(|e| format!("ts column cast: {e}"))?;
            let values = raw.i64().map_err(|e| format!("ts column type: {e}"))?;
            Ok(values
                .into_iter()
                .map(|v| v.and_then(|epoch| from_epoch(epoch, unit)).map(RawTimestamp::Instant))
                .collect())
        }
        other => Err(format!("unsupported ts column type {other:?}")),
    }
}

fn from_epoch(epoch: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(epoch)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(epoch),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(epoch),
    }
}
