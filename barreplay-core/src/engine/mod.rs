//! Replay engine and supporting infrastructure.
//!
//! The engine replays one session at a time over the calendar's bucket grid,
//! dispatching context symbols before the primary in every bucket so that
//! primary subscribers see same-bucket context through the aligner.

pub mod context;
pub mod digest;
pub mod feed;
pub mod live;
pub mod replay;
pub mod subscription;

pub use context::{Aligned, ContextAligner};
pub use digest::DispatchDigest;
pub use feed::{feed_for_mode, Feed, ReplayMode};
pub use live::LiveFeed;
pub use replay::{
    ReplayEngine, ReplayState, ReplaySummary, ReplayWindow, HISTORICAL_SOURCE,
};
pub use subscription::{BarCallback, Dispatch, StopHandle, SubscriptionId, Subscriptions};
