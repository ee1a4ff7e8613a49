// SPDX-License-Identifier: MIT

//! fleet-discovery: C2, finding pre-existing studios by HTTP-probing a
//! port range and classifying responders.

#[cfg(any(test, feature = "test-support"))]
mod fake;
mod probe;
mod scanner;
mod tokens;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHttpProbe;
pub use probe::{HttpProbe, ProbeError, ProbeResponse, RealHttpProbe};
pub use scanner::Discovery;
pub use tokens::project_tokens;

use serde::{Deserialize, Serialize};

/// How a [`DiscoveredStudio`] was found. Both are "ephemeral, never
/// persisted" outputs per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    HttpScan,
    OsEnumeration,
}

/// `{ port, pid_hint, responding, response_time_ms, project_hint,
/// discovery_method }` per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredStudio {
    pub port: u16,
    pub pid_hint: Option<u32>,
    pub responding: bool,
    pub response_time_ms: Option<u64>,
    pub project_hint: Option<String>,
    pub discovery_method: DiscoveryMethod,
}

/// Ports known to collide with platform-local services and skipped
/// without probing, per spec §4.2 ("Known-problem ports in AVOID_PORTS").
/// 3000 is a frequent Windows "HTTP.sys"/IIS-express default; the rest are
/// common local-service defaults worth steering clear of on a shared dev
/// box.
pub const AVOID_PORTS: &[u16] = &[3000, 5000, 5357, 7680];

/// Fixed classification markers for discovery response bodies, per spec
/// §4.2: "studio-specific tokens, a known bundler signature, a UI
/// framework signature, or a composition-related token".
pub const STUDIO_MARKERS: &[&str] = &[
    "remotion",
    "remotion-studio",
    "data-remotion-root",
    "__remotion",
    "vite",
    "react-refresh",
    "composition",
    "<!-- remotion",
];
