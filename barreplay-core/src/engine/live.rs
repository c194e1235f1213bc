//! Paper/live feed stub.
//!
//! It validates provider settings and reports problems as `PROVIDER_ERROR`
//! events. With a usable provider it only publishes a heartbeat; no bars are
//! produced and replay is unsupported.

use super::feed::{Feed, ReplayMode};
use super::replay::{ReplayState, ReplaySummary, ReplayWindow};
use super::subscription::StopHandle;
use crate::bus::EventBus;
use crate::config::{FeedConfig, LiveConfig};
use crate::domain::{Bar, HealthHeartbeat, OpsCode, OpsEvent};
use crate::error::ReplayError;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct LiveFeed {
    live: LiveConfig,
    mode: ReplayMode,
    bus: EventBus,
    env: EnvLookup,
    stop: StopHandle,
    state: ReplayState,
}

impl LiveFeed {
    /// `mode` must be paper or live; it becomes the source label.
    pub fn new(config: &FeedConfig, mode: ReplayMode) -> Result<Self, ReplayError> {
        check_mode(mode)?;
        Ok(Self {
            live: config.live.clone(),
            mode,
            bus: EventBus::new(),
            env: Box::new(|key| std::env::var(key).ok()),
            stop: StopHandle::new(),
            state: ReplayState::Idle,
        })
    }

    /// Replace the process environment with `lookup` for credential checks.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    pub fn state(&self) -> ReplayState {
        self.state
    }

    fn missing_env(&self) -> Vec<String> {
        self.live
            .env_keys
            .iter()
            .filter(|key| (self.env)(key.as_str()).map_or(true, |v| v.is_empty()))
            .cloned()
            .collect()
    }

    fn summary(&self, session: NaiveDate, ops_events: u64, heartbeats: u64) -> ReplaySummary {
        ReplaySummary {
            session,
            source: self.mode.to_string(),
            state: self.state,
            dispatched: BTreeMap::new(),
            heartbeats,
            ops_events,
            digest: blake3::hash(b"").to_hex().to_string(),
        }
    }
}

fn check_mode(mode: ReplayMode) -> Result<(), ReplayError> {
    match mode {
        ReplayMode::Paper | ReplayMode::Live => Ok(()),
        ReplayMode::Historical => Err(ReplayError::ModeMismatch {
            feed: "live",
            mode: mode.to_string(),
        }),
    }
}

impl Feed for LiveFeed {
    fn kind(&self) -> &'static str {
        "live"
    }

    fn start(&mut self, session: NaiveDate, mode: ReplayMode) -> Result<ReplaySummary, ReplayError> {
        check_mode(mode)?;
        self.mode = mode;
        self.stop.clear();
        self.state = ReplayState::Running;

        if !self.live.enabled {
            warn!(provider = %self.live.provider, "live provider disabled");
            self.bus.publish(
                OpsEvent::new(Utc::now(), OpsCode::ProviderError, "Live provider disabled")
                    .with_meta("provider", self.live.provider.clone())
                    .with_meta("enabled", false),
            );
            self.state = ReplayState::Stopped;
            return Ok(self.summary(session, 1, 0));
        }

        let missing = self.missing_env();
        if !missing.is_empty() {
            warn!(?missing, "live provider credentials missing");
            self.bus.publish(
                OpsEvent::new(
                    Utc::now(),
                    OpsCode::ProviderError,
                    "Live provider credentials missing",
                )
                .with_meta("missing", missing),
            );
            self.state = ReplayState::Stopped;
            return Ok(self.summary(session, 1, 0));
        }

        info!(provider = %self.live.provider, mode = %self.mode, "live feed started");
        self.bus.publish(HealthHeartbeat {
            ts: Utc::now(),
            seq_per_symbol: BTreeMap::new(),
        });
        self.state = ReplayState::Completed;
        Ok(self.summary(session, 0, 1))
    }

    fn replay(&mut self, _session: NaiveDate, _window: ReplayWindow) -> Result<ReplaySummary, ReplayError> {
        Err(ReplayError::ReplayUnsupported(self.kind()))
    }

    fn stop(&self) {
        self.stop.stop();
    }

    fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// The stub never dispatches bars.
    fn last_bar(&self, _symbol: &str) -> Option<&Bar> {
        None
    }
}

impl std::fmt::Debug for LiveFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeed")
            .field("live", &self.live)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
