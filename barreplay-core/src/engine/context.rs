//! Causal (no look-ahead) alignment of context symbols onto a primary bar.
//!
//! The store is keyed by (source, session) and keeps the latest ingested bar
//! per symbol. It belongs to one engine configuration and is cleared on
//! reconfiguration, so nothing leaks between independent replays.

use crate::calendar::SessionCalendar;
use crate::domain::Bar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Context symbol → latest bar known as of the primary bar's bucket.
pub type Aligned<'a> = BTreeMap<&'a str, Option<&'a Bar>>;

#[derive(Debug)]
pub struct ContextAligner {
    calendar: Arc<SessionCalendar>,
    context_symbols: Vec<String>,
    store: HashMap<(String, NaiveDate), HashMap<String, Bar>>,
}

impl ContextAligner {
    pub fn new(calendar: Arc<SessionCalendar>, context_symbols: Vec<String>) -> Self {
        Self {
            calendar,
            context_symbols,
            store: HashMap::new(),
        }
    }

    /// Swap calendar and symbol set, dropping every stored observation.
    pub fn reset(&mut self, calendar: Arc<SessionCalendar>, context_symbols: Vec<String>) {
        self.calendar = calendar;
        self.context_symbols = context_symbols;
        self.store.clear();
    }

    /// Forget every observation under one (source, session) key.
    pub fn clear_session(&mut self, source: &str, session: NaiveDate) {
        self.store.remove(&(source.to_string(), session));
    }

    pub fn context_symbols(&self) -> &[String] {
        &self.context_symbols
    }

    /// Record `bar` as the latest observation for its (source, session, symbol).
    ///
    /// Bars whose session cannot be resolved are ignored.
    pub fn ingest(&mut self, bar: &Bar) {
        let Some(session) = self.calendar.session_date_from_ts(bar.ts) else {
            return;
        };
        self.store
            .entry((bar.source.clone(), session))
            .or_default()
            .insert(bar.symbol.clone(), bar.clone());
    }

    pub fn latest(&self, source: &str, session: NaiveDate, symbol: &str) -> Option<&Bar> {
        self.store
            .get(&(source.to_string(), session))
            .and_then(|bars| bars.get(symbol))
    }

    /// For each context symbol, the latest bar in the primary's (source,
    /// session) whose bucket is not after the primary's bucket.
    ///
    /// Returns an empty map when the primary bar has no session.
    pub fn aligned(&self, primary: &Bar) -> Aligned<'_> {
        let Some(session) = self.calendar.session_date_from_ts(primary.ts) else {
            return BTreeMap::new();
        };
        let bucket = self.calendar.bucketize(primary.ts);
        let bars = self.store.get(&(primary.source.clone(), session));

        self.context_symbols
            .iter()
            .map(|symbol| {
                let candidate = bars
                    .and_then(|bars| bars.get(symbol))
                    .filter(|bar| self.calendar.bucketize(bar.ts) <= bucket);
                (symbol.as_str(), candidate)
            })
            .collect()
    }

    /// Number of (source, session) keys held.
    pub fn key_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    fn context() -> Vec<String> {
        ["QQQ", "IWM", "DIA", "VIX"].into_iter().map(String::from).collect()
    }

    fn bar(symbol: &str, ts: DateTime<Utc>, source: &str) -> Bar {
        Bar {
            ts,
            symbol: symbol.into(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: None,
            source: source.into(),
            seq: 1,
        }
    }

    fn grid() -> Vec<DateTime<Utc>> {
        SessionCalendar::default().buckets(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())
    }

    #[test]
    fn same_bucket_context_is_visible() {
        let mut aligner = ContextAligner::new(Arc::new(SessionCalendar::default()), context());
        let t = grid()[10];
        aligner.ingest(&bar("QQQ", t, "historical"));
        let spy = bar("SPY", t, "historical");
        let ctx = aligner.aligned(&spy);

        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx["QQQ"].map(|b| b.ts), Some(t));
        assert!(ctx["IWM"].is_none());
    }

    #[test]
    fn future_context_is_hidden() {
        let mut aligner = ContextAligner::new(Arc::new(SessionCalendar::default()), context());
        let g = grid();
        aligner.ingest(&bar("QQQ", g[11], "historical"));
        let ctx = aligner.aligned(&bar("SPY", g[10], "historical"));
        assert!(ctx["QQQ"].is_none());
    }

    #[test]
    fn latest_observation_overwrites() {
        let mut aligner = ContextAligner::new(Arc::new(SessionCalendar::default()), context());
        let g = grid();
        aligner.ingest(&bar("QQQ", g[3], "historical"));
        aligner.ingest(&bar("QQQ", g[5], "historical"));
        let ctx = aligner.aligned(&bar("SPY", g[7], "historical"));
        assert_eq!(ctx["QQQ"].map(|b| b.ts), Some(g[5]));
    }

    #[test]
    fn sources_do_not_mix() {
        let mut aligner = ContextAligner::new(Arc::new(SessionCalendar::default()), context());
        let t = grid()[0];
        aligner.ingest(&bar("QQQ", t, "paper"));
        let ctx = aligner.aligned(&bar("SPY", t, "historical"));
        assert!(ctx["QQQ"].is_none());
        assert!(aligner.latest("paper", NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), "QQQ").is_some());
    }

    #[test]
    fn sessionless_primary_yields_empty_map() {
        let aligner = ContextAligner::new(Arc::new(SessionCalendar::default()), context());
        let saturday = DateTime::parse_from_rfc3339("2024-01-06T18:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(aligner.aligned(&bar("SPY", saturday, "historical")).is_empty());
    }

    #[test]
    fn reset_clears_store() {
        let calendar = Arc::new(SessionCalendar::default());
        let mut aligner = ContextAligner::new(Arc::clone(&calendar), context());
        aligner.ingest(&bar("QQQ", grid()[0], "historical"));
        assert_eq!(aligner.key_count(), 1);
        aligner.reset(calendar, vec!["QQQ".into()]);
        assert!(aligner.is_empty());
        assert_eq!(aligner.context_symbols(), ["QQQ".to_string()]);
    }

    proptest! {
        /// Whatever order context bars arrive in, nothing later than the primary's bucket is returned.
        #[test]
        fn never_returns_future_buckets(
            ingests in proptest::collection::vec((0usize..4, 0usize..78), 0..40),
            primary_idx in 0usize..78,
        ) {
            let calendar = Arc::new(SessionCalendar::default());
            let mut aligner = ContextAligner::new(Arc::clone(&calendar), context());
            let g = grid();
            let symbols = context();
            for (sym, idx) in ingests {
                // jitter inside the bucket
                aligner.ingest(&bar(&symbols[sym], g[idx] + Duration::seconds(17), "historical"));
            }
            let primary = bar("SPY", g[primary_idx], "historical");
            for (_, maybe) in aligner.aligned(&primary) {
                if let Some(ctx_bar) = maybe {
                    prop_assert!(calendar.bucketize(ctx_bar.ts) <= g[primary_idx]);
                }
            }
        }
    }
}
