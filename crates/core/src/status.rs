// SPDX-License-Identifier: MIT

//! Shared value types describing a studio process.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a spawned or adopted studio, per the state machine
/// in spec §4.3: `spawning -> (ready | assumed_ready) -> running ->
/// (stopping -> stopped) | error`. The persisted form only distinguishes
/// the four states named in the on-disk schema (§6); `spawning` is a
/// transient in-memory state that never reaches disk (a launch call only
/// returns once it has resolved to `running` or failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudioStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl StudioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudioStatus::Starting => "starting",
            StudioStatus::Running => "running",
            StudioStatus::Stopped => "stopped",
            StudioStatus::Error => "error",
        }
    }
}

/// The three URL forms a studio exposes, per the §3 data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioUrls {
    pub local: String,
    pub network: Option<String>,
    pub primary: String,
}

impl StudioUrls {
    /// Build the loopback-only URL set (the common case: no LAN interface
    /// hint available, so `primary` is just `local`).
    pub fn loopback(port: u16) -> Self {
        let local = format!("http://127.0.0.1:{port}/");
        Self { local: local.clone(), network: None, primary: local }
    }
}
