//! Barreplay Core — deterministic session replay of intraday bars.
//!
//! This crate contains:
//! - The exchange session calendar and its bucket grid
//! - Domain values (bars, ops events, heartbeats)
//! - Pluggable record sources (JSON, CSV, parquet, in-memory)
//! - The per-symbol loader and its integrity checks
//! - The replay engine, causal context alignment and the event bus
//! - The paper/live feed stub and configuration

pub mod bus;
pub mod calendar;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;

pub use bus::{EventBus, Payload, Topic};
pub use calendar::SessionCalendar;
pub use config::{load_settings, FeedConfig};
pub use domain::{Bar, HealthHeartbeat, OpsCode, OpsEvent};
pub use engine::{
    feed_for_mode, ContextAligner, Feed, LiveFeed, ReplayEngine, ReplayMode, ReplayState,
    ReplaySummary, ReplayWindow,
};
pub use error::ReplayError;
