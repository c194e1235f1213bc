//! Bar subscriptions held by an engine.
//!
//! A subscription pairs a symbol filter (empty = every symbol) with a
//! callback. Callbacks run synchronously in registration order and receive a
//! [`Dispatch`] view for causal context queries and cooperative stop.

use super::context::{Aligned, ContextAligner};
use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle returned by `subscribe`, used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Shared stop flag. Cloned handles observe the same flag; the engine checks
/// it once per bucket boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a callback sees besides the bar itself.
pub struct Dispatch<'a> {
    context: &'a ContextAligner,
    stop: &'a StopHandle,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(context: &'a ContextAligner, stop: &'a StopHandle) -> Self {
        Self { context, stop }
    }

    /// Context symbols aligned onto `bar` as of its bucket.
    pub fn aligned(&self, bar: &Bar) -> Aligned<'a> {
        self.context.aligned(bar)
    }

    /// Ask the engine to stop after the current bucket.
    pub fn request_stop(&self) {
        self.stop.stop();
    }
}

pub type BarCallback = Box<dyn FnMut(&Bar, &Dispatch<'_>) + Send>;

struct Subscription {
    id: SubscriptionId,
    symbols: BTreeSet<String>,
    callback: BarCallback,
}

impl Subscription {
    fn matches(&self, symbol: &str) -> bool {
        self.symbols.is_empty() || self.symbols.contains(symbol)
    }
}

#[derive(Default)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
    next_id: u64,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I, S>(&mut self, symbols: I, callback: BarCallback) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(Subscription {
            id,
            symbols: symbols.into_iter().map(Into::into).collect(),
            callback,
        });
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every subscription whose filter accepts `bar.symbol`.
    pub fn notify(&mut self, bar: &Bar, dispatch: &Dispatch<'_>) {
        for sub in self.entries.iter_mut().filter(|s| s.matches(&bar.symbol)) {
            (sub.callback)(bar, dispatch);
        }
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| (s.id, &s.symbols)))
            .finish()
    }
}
