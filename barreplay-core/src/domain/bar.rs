//! Bar — the replayed market data unit.

use super::time::{iso_utc, utc_z};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLC(+volume) bar for one symbol in one bucket.
///
/// `ts` is the bucket start, not the raw record timestamp. For a fixed
/// (symbol, session, source) the `seq` values run 1, 2, 3, ... in dispatch
/// order with no gaps or repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(with = "utc_z")]
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    pub source: String,
    pub seq: u64,
}

impl Bar {
    /// Bucket timestamp as ISO-8601 with a `Z` marker.
    pub fn ts_iso(&self) -> String {
        iso_utc(self.ts)
    }

    /// JSON object view of the bar, as downstream consumers see it.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ts": self.ts_iso(),
            "symbol": self.symbol,
            "open": self.open,
            "high": self.high,
            "low": self.low,
            "close": self.close,
            "volume": self.volume,
            "source": self.source,
            "seq": self.seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_bar() -> Bar {
        Bar {
            ts: Utc.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap(),
            symbol: "SPY".into(),
            open: 468.0,
            high: 468.5,
            low: 467.9,
            close: 468.2,
            volume: Some(1_200_000.0),
            source: "historical".into(),
            seq: 1,
        }
    }

    #[test]
    fn serialized_timestamp_carries_utc_marker() {
        let json = serde_json::to_value(sample_bar()).unwrap();
        assert_eq!(json["ts"], "2024-01-03T14:30:00Z");
        assert_eq!(json["seq"], 1);
        assert_eq!(json["source"], "historical");
    }

    #[test]
    fn as_json_matches_serde_view() {
        let bar = sample_bar();
        assert_eq!(bar.as_json(), serde_json::to_value(&bar).unwrap());
    }

    #[test]
    fn missing_volume_serializes_as_null() {
        let mut bar = sample_bar();
        bar.volume = None;
        let back: Bar = serde_json::from_value(bar.as_json()).unwrap();
        assert_eq!(back.volume, None);
        assert_eq!(back, bar);
    }
}
