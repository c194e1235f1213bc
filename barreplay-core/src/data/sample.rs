//! Synthetic session data for fixtures, demos and benchmarks.
//!
//! A seeded random walk produces one bucket-aligned record per bucket of the
//! session. The same (symbol, session, seed) always yields the same rows.

use super::source::{RawRecord, SourceError};
use crate::calendar::SessionCalendar;
use crate::domain::iso_utc;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;

/// One full session of synthetic rows for `symbol`.
pub fn synthetic_session(
    calendar: &SessionCalendar,
    session: NaiveDate,
    symbol: &str,
    seed: u64,
) -> Vec<RawRecord> {
    let mut rng = StdRng::seed_from_u64(seed ^ symbol_salt(symbol));
    let mut price: f64 = rng.gen_range(20.0..500.0);

    calendar
        .buckets(session)
        .into_iter()
        .map(|bucket| {
            let open = cents(price);
            let close = cents((open + rng.gen_range(-0.6..0.6)).max(0.01));
            let high = cents(open.max(close) + rng.gen_range(0.0..0.3));
            let low = cents((open.min(close) - rng.gen_range(0.0..0.3)).max(0.01));
            let volume = rng.gen_range(50_000.0..2_000_000.0_f64).round();
            price = close;
            RawRecord::new(&iso_utc(bucket), open, high, low, close, Some(volume))
        })
        .collect()
}

/// Write rows as a JSON array, the format [`JsonSource`](super::json::JsonSource) reads.
pub fn write_json(path: &Path, records: &[RawRecord]) -> Result<(), SourceError> {
    let text = serde_json::to_string_pretty(records).map_err(|e| SourceError::Decode {
        path: path.to_path_buf(),
        reason: format!("serialize: {e}"),
    })?;
    fs::write(path, text).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn symbol_salt(symbol: &str) -> u64 {
    let hash = blake3::hash(symbol.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
