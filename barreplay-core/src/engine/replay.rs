//! Historical session replay.
//!
//! One call to [`ReplayEngine::replay`] loads every configured symbol for a
//! session, then walks the calendar's bucket grid:
//!
//! 1. Context symbols dispatch first, in instrument order, then the primary.
//! 2. A dispatch assigns the next per-(symbol, session) sequence number,
//!    publishes on `bar-update`, feeds the context aligner and finally calls
//!    matching subscriptions.
//! 3. A heartbeat follows any bucket that dispatched, once `heartbeat_secs`
//!    of session time have passed since the previous one.
//! 4. Exactly one `SESSION_CLOSE` ends the run, stopped early or not.
//!
//! Every symbol is loaded before anything is published, so a fatal load
//! error leaves the bus untouched.

use super::context::ContextAligner;
use super::digest::DispatchDigest;
use super::subscription::{BarCallback, Dispatch, StopHandle, SubscriptionId, Subscriptions};
use crate::bus::EventBus;
use crate::calendar::SessionCalendar;
use crate::config::{ConfigError, FeedConfig};
use crate::data::{BarFields, BarSource, FileSource, SymbolLoader, SymbolSession};
use crate::domain::{Bar, HealthHeartbeat, OpsCode, OpsEvent};
use crate::error::ReplayError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Source label of historically replayed bars.
pub const HISTORICAL_SOURCE: &str = "historical";

/// Lifecycle of an engine. `Running` is only observable from callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Optional inclusive bounds on the buckets replayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ReplayWindow {
    /// The whole session.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    fn starts_after(&self, bucket: DateTime<Utc>) -> bool {
        self.from.is_some_and(|from| bucket < from)
    }

    fn ends_before(&self, bucket: DateTime<Utc>) -> bool {
        self.to.is_some_and(|to| bucket > to)
    }
}

/// Outcome of one replay run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub session: NaiveDate,
    pub source: String,
    pub state: ReplayState,
    /// Bars dispatched per instrument (zero for symbols with no data).
    pub dispatched: BTreeMap<String, u64>,
    pub heartbeats: u64,
    /// Ops events published during the run, `SESSION_CLOSE` included.
    pub ops_events: u64,
    /// BLAKE3 over the ordered (symbol, seq, ts) dispatch stream.
    pub digest: String,
}

impl ReplaySummary {
    pub fn total_dispatched(&self) -> u64 {
        self.dispatched.values().sum()
    }
}

pub struct ReplayEngine {
    config: FeedConfig,
    calendar: Arc<SessionCalendar>,
    source: Box<dyn BarSource>,
    bus: EventBus,
    context: ContextAligner,
    subscriptions: Subscriptions,
    heartbeat_every: Duration,
    seq: HashMap<(String, NaiveDate), u64>,
    last_bars: HashMap<String, Bar>,
    stop: StopHandle,
    state: ReplayState,
}

impl ReplayEngine {
    /// Engine reading files through [`FileSource`] with the calendar the
    /// config describes.
    pub fn new(config: FeedConfig) -> Result<Self, ReplayError> {
        let calendar = Arc::new(config.calendar()?);
        let heartbeat_every = config.heartbeat_interval()?;
        let context = ContextAligner::new(Arc::clone(&calendar), context_symbols(&config)?);
        Ok(Self {
            config,
            calendar,
            source: Box::new(FileSource),
            bus: EventBus::new(),
            context,
            subscriptions: Subscriptions::new(),
            heartbeat_every,
            seq: HashMap::new(),
            last_bars: HashMap::new(),
            stop: StopHandle::new(),
            state: ReplayState::Idle,
        })
    }

    /// Swap the record backend. Clears the context store.
    pub fn with_source(mut self, source: impl BarSource + 'static) -> Self {
        self.source = Box::new(source);
        self.reset_context();
        self
    }

    /// Share an existing calendar. Clears the context store.
    pub fn with_calendar(mut self, calendar: Arc<SessionCalendar>) -> Self {
        self.calendar = calendar;
        self.reset_context();
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Swap the configuration. Calendar, context store, sequence counters and
    /// last bars all start over.
    pub fn reconfigure(&mut self, config: FeedConfig) -> Result<(), ReplayError> {
        let calendar = Arc::new(config.calendar()?);
        let heartbeat_every = config.heartbeat_interval()?;
        let symbols = context_symbols(&config)?;
        self.config = config;
        self.heartbeat_every = heartbeat_every;
        self.calendar = Arc::clone(&calendar);
        self.context.reset(calendar, symbols);
        self.seq.clear();
        self.last_bars.clear();
        self.state = ReplayState::Idle;
        Ok(())
    }

    fn reset_context(&mut self) {
        let symbols = self.context.context_symbols().to_vec();
        self.context.reset(Arc::clone(&self.calendar), symbols);
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn calendar(&self) -> &SessionCalendar {
        &self.calendar
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn into_bus(self) -> EventBus {
        self.bus
    }

    pub fn context(&self) -> &ContextAligner {
        &self.context
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    /// Register `callback` for bars of `symbols` (empty = every symbol).
    pub fn subscribe<I, S, F>(&mut self, symbols: I, callback: F) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&Bar, &Dispatch<'_>) + Send + 'static,
    {
        let callback: BarCallback = Box::new(callback);
        self.subscriptions.add(symbols, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(id)
    }

    /// Handle that stops a running replay at the next bucket boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Most recent bar dispatched for `symbol`.
    pub fn last_bar(&self, symbol: &str) -> Option<&Bar> {
        self.last_bars.get(symbol)
    }

    /// Latest sequence number assigned to (symbol, session), 0 if none.
    pub fn sequence(&self, symbol: &str, session: NaiveDate) -> u64 {
        self.seq
            .get(&(symbol.to_string(), session))
            .copied()
            .unwrap_or(0)
    }

    /// Replay `session`, restricted to `window`.
    pub fn replay(
        &mut self,
        session: NaiveDate,
        window: ReplayWindow,
    ) -> Result<ReplaySummary, ReplayError> {
        let instruments = self.config.instrument_set()?;
        let loaded = self.load_all(&instruments, session)?;
        let Some((primary, context)) = loaded.split_first() else {
            return Err(ConfigError::NoSymbols.into());
        };

        info!(
            %session,
            primary = %primary.symbol,
            context = context.len(),
            backend = self.source.name(),
            "replay started"
        );

        self.stop.clear();
        self.state = ReplayState::Running;
        self.context.clear_session(HISTORICAL_SOURCE, session);

        let mut ops_events = 0u64;
        for event in loaded.iter().flat_map(|s| s.events.iter()) {
            self.bus.publish(event.clone());
            ops_events += 1;
        }

        for symbol in &instruments {
            self.seq.insert((symbol.clone(), session), 0);
        }

        let buckets = self.calendar.buckets(session);
        let heartbeat_every = self.heartbeat_every;
        let mut last_heartbeat: Option<DateTime<Utc>> = None;
        let mut heartbeats = 0u64;
        let mut digest = DispatchDigest::new();

        for &bucket in &buckets {
            if window.starts_after(bucket) {
                continue;
            }
            if window.ends_before(bucket) {
                break;
            }
            if self.stop.is_stopped() {
                break;
            }

            let mut dispatched_any = false;
            for symbol_session in context.iter().chain(std::iter::once(primary)) {
                if let Some(fields) = symbol_session.get(bucket) {
                    self.dispatch(&symbol_session.symbol, session, bucket, *fields, &mut digest);
                    dispatched_any = true;
                }
            }

            let due = last_heartbeat.map_or(true, |last| bucket - last >= heartbeat_every);
            if dispatched_any && due {
                let seq_per_symbol = instruments
                    .iter()
                    .map(|s| (s.clone(), self.sequence(s, session)))
                    .collect();
                self.bus.publish(HealthHeartbeat {
                    ts: bucket,
                    seq_per_symbol,
                });
                last_heartbeat = Some(bucket);
                heartbeats += 1;
            }
        }

        let stopped = self.stop.is_stopped();
        let close_ts = buckets
            .last()
            .copied()
            .unwrap_or_else(|| self.calendar.session_close(session));
        self.bus.publish(
            OpsEvent::new(close_ts, OpsCode::SessionClose, "Session replay completed")
                .with_meta("session_date", session.to_string())
                .with_meta("source", HISTORICAL_SOURCE)
                .with_meta("stopped", stopped),
        );
        ops_events += 1;

        self.state = if stopped {
            ReplayState::Stopped
        } else {
            ReplayState::Completed
        };

        let summary = ReplaySummary {
            session,
            source: HISTORICAL_SOURCE.to_string(),
            state: self.state,
            dispatched: instruments
                .iter()
                .map(|s| (s.clone(), self.sequence(s, session)))
                .collect(),
            heartbeats,
            ops_events,
            digest: digest.hex(),
        };
        info!(
            %session,
            bars = summary.total_dispatched(),
            heartbeats,
            ops_events,
            state = ?summary.state,
            "replay finished"
        );
        Ok(summary)
    }

    fn load_all(
        &self,
        instruments: &[String],
        session: NaiveDate,
    ) -> Result<Vec<SymbolSession>, ReplayError> {
        let loader = SymbolLoader::new(&self.calendar);
        instruments
            .iter()
            .map(|symbol| -> Result<SymbolSession, ReplayError> {
                let path = self.config.resolve_path(symbol)?;
                Ok(loader.load(self.source.as_ref(), symbol, path, session)?)
            })
            .collect()
    }

    fn dispatch(
        &mut self,
        symbol: &str,
        session: NaiveDate,
        bucket: DateTime<Utc>,
        fields: BarFields,
        digest: &mut DispatchDigest,
    ) {
        let counter = self.seq.entry((symbol.to_string(), session)).or_insert(0);
        *counter += 1;
        let bar = Bar {
            ts: bucket,
            symbol: symbol.to_string(),
            open: fields.open,
            high: fields.high,
            low: fields.low,
            close: fields.close,
            volume: fields.volume,
            source: HISTORICAL_SOURCE.to_string(),
            seq: *counter,
        };

        self.bus.publish(bar.clone());
        self.context.ingest(&bar);
        let dispatch = Dispatch::new(&self.context, &self.stop);
        self.subscriptions.notify(&bar, &dispatch);

        digest.update(&bar);
        self.last_bars.insert(bar.symbol.clone(), bar);
    }
}

/// Configured context symbols, minus the primary and repeats.
fn context_symbols(config: &FeedConfig) -> Result<Vec<String>, ConfigError> {
    let primary = config.primary_symbol()?;
    let mut symbols: Vec<String> = Vec::new();
    for symbol in &config.context_symbols {
        if symbol != primary && !symbols.contains(symbol) {
            symbols.push(symbol.clone());
        }
    }
    Ok(symbols)
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine")
            .field("symbols", &self.config.symbols)
            .field("source", &self.source.name())
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
