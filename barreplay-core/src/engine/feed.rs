//! Replay modes and the feed abstraction shared by historical and live feeds.

use super::live::LiveFeed;
use super::replay::{ReplayEngine, ReplaySummary, ReplayWindow};
use crate::bus::EventBus;
use crate::config::FeedConfig;
use crate::domain::Bar;
use crate::error::ReplayError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Historical,
    Paper,
    Live,
}

impl ReplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplayMode::Historical => "historical",
            ReplayMode::Paper => "paper",
            ReplayMode::Live => "live",
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplayMode {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "historical" => Ok(ReplayMode::Historical),
            "paper" => Ok(ReplayMode::Paper),
            "live" => Ok(ReplayMode::Live),
            _ => Err(ReplayError::UnsupportedMode(s.to_string())),
        }
    }
}

/// A bar feed that can be started for a session.
pub trait Feed: Send {
    /// Feed kind used in errors and logs.
    fn kind(&self) -> &'static str;

    /// Run `session` in `mode`. Fails with `ModeMismatch` if this feed does
    /// not serve `mode`.
    fn start(&mut self, session: NaiveDate, mode: ReplayMode) -> Result<ReplaySummary, ReplayError>;

    /// Replay `session` restricted to `window`.
    fn replay(&mut self, session: NaiveDate, window: ReplayWindow) -> Result<ReplaySummary, ReplayError>;

    fn stop(&self);

    fn bus(&self) -> &EventBus;

    fn bus_mut(&mut self) -> &mut EventBus;

    fn last_bar(&self, symbol: &str) -> Option<&Bar>;
}

impl Feed for ReplayEngine {
    fn kind(&self) -> &'static str {
        "historical"
    }

    fn start(&mut self, session: NaiveDate, mode: ReplayMode) -> Result<ReplaySummary, ReplayError> {
        if mode != ReplayMode::Historical {
            return Err(ReplayError::ModeMismatch {
                feed: self.kind(),
                mode: mode.to_string(),
            });
        }
        ReplayEngine::replay(self, session, ReplayWindow::full())
    }

    fn replay(&mut self, session: NaiveDate, window: ReplayWindow) -> Result<ReplaySummary, ReplayError> {
        ReplayEngine::replay(self, session, window)
    }

    fn stop(&self) {
        ReplayEngine::stop(self);
    }

    fn bus(&self) -> &EventBus {
        ReplayEngine::bus(self)
    }

    fn bus_mut(&mut self) -> &mut EventBus {
        ReplayEngine::bus_mut(self)
    }

    fn last_bar(&self, symbol: &str) -> Option<&Bar> {
        ReplayEngine::last_bar(self, symbol)
    }
}

/// Build the feed serving `mode`.
pub fn feed_for_mode(config: FeedConfig, mode: ReplayMode) -> Result<Box<dyn Feed>, ReplayError> {
    match mode {
        ReplayMode::Historical => Ok(Box::new(ReplayEngine::new(config)?)),
        ReplayMode::Paper | ReplayMode::Live => Ok(Box::new(LiveFeed::new(&config, mode)?)),
    }
}
