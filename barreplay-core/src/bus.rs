//! Synchronous publish/subscribe fabric with per-topic history.
//!
//! Every published payload is appended to its topic's history before any
//! listener runs, and listeners are invoked in registration order on the
//! publishing thread. Listeners only ever see `&Payload`, so they cannot
//! mutate the bus while it is iterating them.

use crate::domain::{Bar, HealthHeartbeat, OpsEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Well-known topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    BarUpdate,
    OpsEvent,
    HealthHeartbeat,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::BarUpdate, Topic::OpsEvent, Topic::HealthHeartbeat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::BarUpdate => "bar-update",
            Topic::OpsEvent => "ops-event",
            Topic::HealthHeartbeat => "health-heartbeat",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published value; its variant decides the topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bar(Bar),
    Ops(OpsEvent),
    Heartbeat(HealthHeartbeat),
}

impl Payload {
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Bar(_) => Topic::BarUpdate,
            Payload::Ops(_) => Topic::OpsEvent,
            Payload::Heartbeat(_) => Topic::HealthHeartbeat,
        }
    }

    pub fn as_bar(&self) -> Option<&Bar> {
        match self {
            Payload::Bar(bar) => Some(bar),
            _ => None,
        }
    }

    pub fn as_ops(&self) -> Option<&OpsEvent> {
        match self {
            Payload::Ops(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_heartbeat(&self) -> Option<&HealthHeartbeat> {
        match self {
            Payload::Heartbeat(hb) => Some(hb),
            _ => None,
        }
    }
}

impl From<Bar> for Payload {
    fn from(bar: Bar) -> Self {
        Payload::Bar(bar)
    }
}

impl From<OpsEvent> for Payload {
    fn from(event: OpsEvent) -> Self {
        Payload::Ops(event)
    }
}

impl From<HealthHeartbeat> for Payload {
    fn from(hb: HealthHeartbeat) -> Self {
        Payload::Heartbeat(hb)
    }
}

/// Topic listener.
pub type Listener = Box<dyn FnMut(&Payload) + Send>;

/// In-process event bus. History is unbounded and kept for inspection.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<Topic, Vec<Listener>>,
    history: HashMap<Topic, Vec<Payload>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, topic: Topic, listener: F)
    where
        F: FnMut(&Payload) + Send + 'static,
    {
        self.listeners.entry(topic).or_default().push(Box::new(listener));
    }

    /// Record `payload` in its topic's history, then notify that topic's listeners.
    pub fn publish(&mut self, payload: impl Into<Payload>) {
        let payload = payload.into();
        let topic = payload.topic();
        let history = self.history.entry(topic).or_default();
        history.push(payload);
        let Some(published) = history.last() else {
            return;
        };
        if let Some(listeners) = self.listeners.get_mut(&topic) {
            for listener in listeners.iter_mut() {
                listener(published);
            }
        }
    }

    pub fn history(&self, topic: Topic) -> &[Payload] {
        self.history.get(&topic).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bars(&self) -> impl Iterator<Item = &Bar> {
        self.history(Topic::BarUpdate).iter().filter_map(Payload::as_bar)
    }

    pub fn ops_events(&self) -> impl Iterator<Item = &OpsEvent> {
        self.history(Topic::OpsEvent).iter().filter_map(Payload::as_ops)
    }

    pub fn heartbeats(&self) -> impl Iterator<Item = &HealthHeartbeat> {
        self.history(Topic::HealthHeartbeat)
            .iter()
            .filter_map(Payload::as_heartbeat)
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.listeners.get(&topic).map_or(0, Vec::len)
    }

    /// Drop retained history; listeners stay registered.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for topic in Topic::ALL {
            map.entry(
                &topic.as_str(),
                &format!(
                    "{} listeners, {} retained",
                    self.listener_count(topic),
                    self.history(topic).len()
                ),
            );
        }
        map.finish()
    }
}
