//! Per-symbol load → normalize → validate pipeline.
//!
//! Turns one symbol's raw records into a bucket → fields map for a single
//! session. Data-quality problems become [`OpsEvent`]s and never abort:
//!
//! - `OUT_OF_ORDER`: the raw input was not chronological (one event per load).
//! - `DUPLICATE`: more than one record landed in a bucket; the last one wins.
//! - `GAP`: expected buckets with no record, listed ascending.
//!
//! Only a malformed record (missing field, unparsable timestamp) or a failing
//! source is fatal.

use super::source::{BarSource, RawRecord, RawTimestamp, SourceError};
use crate::calendar::SessionCalendar;
use crate::domain::{iso_utc, parse_utc, OpsCode, OpsEvent};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Fatal load errors.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("record {index} for {symbol} is missing required field '{field}'")]
    MissingField {
        symbol: String,
        index: usize,
        field: &'static str,
    },

    #[error("record {index} for {symbol} has unparsable timestamp '{value}'")]
    InvalidTimestamp {
        symbol: String,
        index: usize,
        value: String,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Normalized OHLC(+volume) values of one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarFields {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// Output of loading one symbol for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolSession {
    pub symbol: String,
    pub session: NaiveDate,
    /// Bucket start → last record observed in that bucket.
    pub buckets: BTreeMap<DateTime<Utc>, BarFields>,
    /// Integrity events in detection order.
    pub events: Vec<OpsEvent>,
    /// Records read from the source.
    pub raw_count: usize,
    /// Records dropped for being outside RTH or in another session.
    pub excluded_count: usize,
}

impl SymbolSession {
    pub fn get(&self, bucket: DateTime<Utc>) -> Option<&BarFields> {
        self.buckets.get(&bucket)
    }

    pub fn has_event(&self, code: OpsCode) -> bool {
        self.events.iter().any(|e| e.code == code)
    }
}

struct ParsedRow {
    ts: DateTime<Utc>,
    fields: BarFields,
}

/// Loads symbols against a calendar.
pub struct SymbolLoader<'a> {
    calendar: &'a SessionCalendar,
}

impl<'a> SymbolLoader<'a> {
    pub fn new(calendar: &'a SessionCalendar) -> Self {
        Self { calendar }
    }

    /// Read `path` through `source` and normalize it for `session`.
    pub fn load(
        &self,
        source: &dyn BarSource,
        symbol: &str,
        path: &Path,
        session: NaiveDate,
    ) -> Result<SymbolSession, LoadError> {
        let records = source.read_records(symbol, path)?;
        debug!(
            symbol,
            path = %path.display(),
            backend = source.name(),
            records = records.len(),
            "read symbol records"
        );
        self.normalize(symbol, session, records)
    }

    /// Normalize already-read records for `session`.
    pub fn normalize(
        &self,
        symbol: &str,
        session: NaiveDate,
        records: Vec<RawRecord>,
    ) -> Result<SymbolSession, LoadError> {
        let raw_count = records.len();
        let mut events = Vec::new();

        // 1-2. Parse, noting whether the input arrived in order.
        let mut rows = Vec::with_capacity(raw_count);
        let mut monotonic = true;
        let mut last_ts: Option<DateTime<Utc>> = None;
        for (index, record) in records.into_iter().enumerate() {
            let row = parse_row(symbol, index, record)?;
            if last_ts.is_some_and(|prev| row.ts < prev) {
                monotonic = false;
            }
            last_ts = Some(row.ts);
            rows.push(row);
        }
        if let (false, Some(last)) = (monotonic, last_ts) {
            events.push(OpsEvent::new(
                last,
                OpsCode::OutOfOrder,
                format!("Out-of-order bars detected for {symbol}"),
            ));
        }

        // 3. Stable sort.
        rows.sort_by_key(|row| row.ts);

        // 4. Keep only this session's RTH records.
        let before = rows.len();
        rows.retain(|row| {
            self.calendar.in_rth(row.ts)
                && self.calendar.session_date_from_ts(row.ts) == Some(session)
        });
        let excluded_count = before - rows.len();

        // 5. Bucketize; last write wins.
        let mut buckets = BTreeMap::new();
        let mut hits: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
        for row in rows {
            let bucket = self.calendar.bucketize(row.ts);
            *hits.entry(bucket).or_default() += 1;
            buckets.insert(bucket, row.fields);
        }
        let duplicated: Vec<DateTime<Utc>> = hits
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(bucket, _)| bucket)
            .collect();
        if let Some(latest) = duplicated.last() {
            events.push(
                OpsEvent::new(
                    *latest,
                    OpsCode::Duplicate,
                    format!("Duplicate bars detected for {symbol}"),
                )
                .with_meta("count", duplicated.len()),
            );
        }

        // 6. Compare against the full expected grid.
        if !buckets.is_empty() {
            let missing: Vec<DateTime<Utc>> = self
                .calendar
                .buckets(session)
                .into_iter()
                .filter(|bucket| !buckets.contains_key(bucket))
                .collect();
            if let Some(first) = missing.first() {
                let listed: Vec<String> = missing.iter().map(|b| iso_utc(*b)).collect();
                events.push(
                    OpsEvent::new(*first, OpsCode::Gap, format!("Missing bars for {symbol}"))
                        .with_meta("missing", listed),
                );
            }
        }

        for event in &events {
            warn!(symbol, code = %event.code, ts = %iso_utc(event.ts), "{}", event.message);
        }

        Ok(SymbolSession {
            symbol: symbol.to_string(),
            session,
            buckets,
            events,
            raw_count,
            excluded_count,
        })
    }
}

fn parse_row(symbol: &str, index: usize, record: RawRecord) -> Result<ParsedRow, LoadError> {
    let missing = |field: &'static str| LoadError::MissingField {
        symbol: symbol.to_string(),
        index,
        field,
    };
    let ts = match record.ts.ok_or_else(|| missing("ts"))? {
        RawTimestamp::Instant(ts) => ts,
        RawTimestamp::Text(text) => parse_utc(&text).map_err(|_| LoadError::InvalidTimestamp {
            symbol: symbol.to_string(),
            index,
            value: text.clone(),
        })?,
    };
    Ok(ParsedRow {
        ts,
        fields: BarFields {
            open: record.open.ok_or_else(|| missing("open"))?,
            high: record.high.ok_or_else(|| missing("high"))?,
            low: record.low.ok_or_else(|| missing("low"))?,
            close: record.close.ok_or_else(|| missing("close"))?,
            volume: record.volume,
        },
    })
}
