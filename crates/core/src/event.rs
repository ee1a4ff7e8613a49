// SPDX-License-Identifier: MIT

//! Events emitted to external collaborators, per spec §6.
//!
//! The source system's in-process event bus is replaced with a small typed
//! publish channel per component (spec §9 design note): [`EventSink`] wraps
//! a `tokio::sync::broadcast::Sender<FleetEvent>`, and every component
//! that raises events (the Registry, the Health Monitor) owns its own
//! instance rather than sharing one, so a subscriber filtering by port
//! never has to wade through another component's events to find theirs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events that flow out of the fleet to external collaborators (the
/// out-of-scope MCP tool-registry / audit-log layer described in spec §1).
///
/// Serializes with `{"type": "studio:launched", ...fields}`, matching the
/// teacher's `Event` enum shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FleetEvent {
    #[serde(rename = "studioLaunched")]
    StudioLaunched { port: u16, pid: u32, project_path: String, reused: bool },

    #[serde(rename = "studioAdopted")]
    StudioAdopted { port: u16, pid: u32, project_hint: Option<String> },

    #[serde(rename = "studioStopped")]
    StudioStopped { port: u16, pid: u32, forced: bool },

    #[serde(rename = "studioUnhealthy")]
    StudioUnhealthy { port: u16, consecutive_failures: u32, last_error: Option<String> },

    #[serde(rename = "studioRecovered")]
    StudioRecovered { port: u16, new_pid: u32, attempts: u32 },

    #[serde(rename = "recoveryFailed")]
    RecoveryFailed { port: u16, attempts: u32, error: String },

    #[serde(rename = "healthCheck")]
    HealthCheck { healthy: usize, unhealthy: usize, recovered: usize },
}

impl FleetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FleetEvent::StudioLaunched { .. } => "studioLaunched",
            FleetEvent::StudioAdopted { .. } => "studioAdopted",
            FleetEvent::StudioStopped { .. } => "studioStopped",
            FleetEvent::StudioUnhealthy { .. } => "studioUnhealthy",
            FleetEvent::StudioRecovered { .. } => "studioRecovered",
            FleetEvent::RecoveryFailed { .. } => "recoveryFailed",
            FleetEvent::HealthCheck { .. } => "healthCheck",
        }
    }

    /// The port this event concerns, if any. `healthCheck` sweep reports
    /// are fleet-wide and have none.
    pub fn port(&self) -> Option<u16> {
        match self {
            FleetEvent::StudioLaunched { port, .. }
            | FleetEvent::StudioAdopted { port, .. }
            | FleetEvent::StudioStopped { port, .. }
            | FleetEvent::StudioUnhealthy { port, .. }
            | FleetEvent::StudioRecovered { port, .. }
            | FleetEvent::RecoveryFailed { port, .. } => Some(*port),
            FleetEvent::HealthCheck { .. } => None,
        }
    }
}

/// A subscription filter over [`FleetEvent`]s.
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive everything.
    #[default]
    All,
    /// Receive only events naming this port.
    Port(u16),
    /// Receive only events whose `name()` is in this list.
    Names(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &FleetEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Port(p) => event.port() == Some(*p),
            EventFilter::Names(names) => names.contains(&event.name()),
        }
    }
}

/// Default channel depth for a component's [`EventSink`]. Lagging
/// subscribers drop the oldest events rather than block publishers.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// One component's outbound event channel. Each of the Registry and the
/// Health Monitor owns one of these, per spec §9's replacement for the
/// source system's in-process event bus.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<FleetEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Best-effort publish: a channel with no subscribers is not an error.
    pub fn publish(&self, event: FleetEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        EventReceiver { rx: self.tx.subscribe(), filter }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription handle returned by [`EventSink::subscribe`]. Only events
/// matching the filter are ever yielded by [`EventReceiver::recv`].
pub struct EventReceiver {
    rx: broadcast::Receiver<FleetEvent>,
    filter: EventFilter,
}

impl EventReceiver {
    /// Waits for the next event matching the filter. Returns `None` once
    /// the sink is dropped; silently skips events lost to a slow-consumer
    /// lag rather than surfacing the gap to the caller.
    pub async fn recv(&mut self) -> Option<FleetEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
