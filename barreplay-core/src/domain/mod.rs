//! Domain values published by the replay engine.

pub mod bar;
pub mod event;
pub mod time;

pub use bar::Bar;
pub use event::{HealthHeartbeat, OpsCode, OpsEvent};
pub use time::{iso_utc, parse_utc};
