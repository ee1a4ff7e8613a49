// SPDX-License-Identifier: MIT

//! The persisted registry document, per spec §6's on-disk format.

use chrono::{DateTime, Utc};
use fleet_core::{StudioStatus, StudioUrls};
use serde::{Deserialize, Serialize};

/// `{ last_updated, instances }` at `<assets>/.studio-registry.json`. Missing
/// file means an empty registry; unknown fields are ignored by `serde`'s
/// default "reject unknown" being off (we don't set `deny_unknown_fields`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub last_updated: DateTime<Utc>,
    pub instances: Vec<StudioInstance>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self { last_updated: Utc::now(), instances: Vec::new() }
    }
}

/// A persisted studio instance, per spec §3. `pid == 0` is the documented
/// sentinel for "unknown, HTTP-discovery-only" (an instance adopted from a
/// [`fleet_discovery::DiscoveredStudio`] with no `pid_hint`) — see
/// DESIGN.md's Open Question resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioInstance {
    pub pid: u32,
    pub port: u16,
    pub project_path: String,
    pub project_name: String,
    pub start_time: u64,
    pub status: StudioStatus,
    pub url: String,
    pub urls: StudioUrls,
}

impl StudioInstance {
    pub fn new(
        pid: u32,
        port: u16,
        project_path: impl Into<String>,
        project_name: impl Into<String>,
        start_time: u64,
        status: StudioStatus,
    ) -> Self {
        let urls = StudioUrls::loopback(port);
        Self {
            pid,
            port,
            project_path: project_path.into(),
            project_name: project_name.into(),
            start_time,
            status,
            url: urls.primary.clone(),
            urls,
        }
    }

    /// `pid == 0` means this instance was adopted without a confirmed pid
    /// and can only be reasoned about via HTTP discovery.
    pub fn has_known_pid(&self) -> bool {
        self.pid != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_urls_from_port() {
        let instance = StudioInstance::new(100, 3050, "/p", "demo", 0, StudioStatus::Running);
        assert_eq!(instance.urls.local, "http://127.0.0.1:3050/");
        assert_eq!(instance.url, instance.urls.primary);
    }

    #[test]
    fn pid_zero_is_unknown_sentinel() {
        let instance = StudioInstance::new(0, 3050, "/p", "demo", 0, StudioStatus::Running);
        assert!(!instance.has_known_pid());
    }
}
