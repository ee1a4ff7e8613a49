// SPDX-License-Identifier: MIT

//! [`Discovery`]: C2 process discovery, per spec §4.2 — HTTP-probe a port
//! range and classify responders without ever binding or mutating the
//! host.

use crate::probe::HttpProbe;
use crate::tokens::body_matches_project;
use crate::{DiscoveredStudio, DiscoveryMethod, AVOID_PORTS, STUDIO_MARKERS};
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Default per-port probe timeout, per spec §4.2 ("an independent,
/// short timeout per port").
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

fn title_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    PATTERN.get_or_init(|| Regex::new(r"(?is)<title[^>]*>\s*([^<]+?)\s*</title>").unwrap())
}

/// Scans a port range over a pluggable [`HttpProbe`]. Stateless beyond the
/// probe and timeout — every call re-derives its result from the live
/// responses, per spec §4.2's "always a live read, never a cache".
pub struct Discovery<P: HttpProbe> {
    probe: P,
    timeout: Duration,
}

impl<P: HttpProbe> Discovery<P> {
    pub fn new(probe: P) -> Self {
        Self { probe, timeout: DEFAULT_PROBE_TIMEOUT }
    }

    pub fn with_timeout(probe: P, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Probes every port in `range` (default min..=max of a typical studio
    /// block when `None`), skipping [`AVOID_PORTS`] without probing them.
    /// Non-responding ports are omitted from the result, per spec §4.2
    /// ("only responders are reported").
    pub async fn discover(&self, range: Option<RangeInclusive<u16>>) -> Vec<DiscoveredStudio> {
        let range = range.unwrap_or(3002..=3100);
        let mut found = Vec::new();
        for port in range {
            if AVOID_PORTS.contains(&port) {
                continue;
            }
            if let Some(studio) = self.identify(port).await {
                found.push(studio);
            }
        }
        found
    }

    /// Probes a single port and classifies the response, or `None` if it
    /// doesn't respond or doesn't look like a studio, per spec §4.2's
    /// classification markers.
    pub async fn identify(&self, port: u16) -> Option<DiscoveredStudio> {
        let response = self.probe.get(port, self.timeout).await.ok()?;
        if !response.is_responding() {
            debug!(port, status = response.status, "discovery: non-2xx/3xx/4xx, skipping");
            return None;
        }
        let body_lower = response.body.to_lowercase();
        let looks_like_studio = STUDIO_MARKERS.iter().any(|marker| body_lower.contains(marker));
        if !looks_like_studio {
            return None;
        }
        let project_hint = title_pattern()
            .captures(&response.body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());

        Some(DiscoveredStudio {
            port,
            pid_hint: None,
            responding: true,
            response_time_ms: Some(response.elapsed_ms),
            project_hint,
            discovery_method: DiscoveryMethod::HttpScan,
        })
    }

    /// A single HEAD probe of `port`, exposed for callers (the Lifecycle
    /// Engine's post-spawn HTTP validation, the Health Monitor's sweep)
    /// that need a raw status code rather than studio classification.
    pub async fn head(&self, port: u16, timeout: Duration) -> Result<u16, crate::probe::ProbeError> {
        self.probe.head(port, timeout).await
    }

    /// Scans the default range and returns the studio whose project hint
    /// (or response body) best matches `preferred_project`; otherwise "the
    /// youngest responder" per spec §4.2. Nothing in a [`DiscoveredStudio`]
    /// carries a start time, so — documented in DESIGN.md — the highest
    /// port in the managed range is used as a proxy for "youngest", since
    /// ports are handed out in ascending order as older studios occupy the
    /// low end of the range.
    pub async fn find_best(&self, preferred_project: Option<&str>) -> Option<DiscoveredStudio> {
        let mut candidates = self.discover(None).await;
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by_key(|c| std::cmp::Reverse(c.port));

        if let Some(project) = preferred_project {
            if let Some(best) = candidates.iter().find(|c| {
                c.project_hint.as_deref().is_some_and(|hint| body_matches_project(hint, project))
            }) {
                return Some(best.clone());
            }
        }

        candidates.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeHttpProbe;

    #[tokio::test]
    async fn identify_skips_non_responding_port() {
        let probe = FakeHttpProbe::new();
        let discovery = Discovery::new(probe);
        assert!(discovery.identify(3002).await.is_none());
    }

    #[tokio::test]
    async fn identify_skips_response_without_markers() {
        let probe = FakeHttpProbe::new();
        probe.set_response(3002, 200, "<html><body>hello</body></html>");
        let discovery = Discovery::new(probe);
        assert!(discovery.identify(3002).await.is_none());
    }

    #[tokio::test]
    async fn identify_finds_studio_and_title() {
        let probe = FakeHttpProbe::new();
        probe.set_response(
            3002,
            200,
            "<html><head><title>my-app</title></head><body data-remotion-root>x</body></html>",
        );
        let discovery = Discovery::new(probe);
        let studio = discovery.identify(3002).await.expect("should identify");
        assert_eq!(studio.project_hint.as_deref(), Some("my-app"));
        assert_eq!(studio.discovery_method, DiscoveryMethod::HttpScan);
    }

    #[tokio::test]
    async fn discover_skips_avoid_ports() {
        let probe = FakeHttpProbe::new();
        probe.set_response(3000, 200, "remotion-studio");
        let discovery = Discovery::with_timeout(probe, Duration::from_millis(50));
        let found = discovery.discover(Some(3000..=3000)).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn find_best_prefers_matching_project() {
        let probe = FakeHttpProbe::new();
        probe.set_response(3002, 200, "<title>other-app</title>remotion");
        probe.set_response(3003, 200, "<title>my-app</title>remotion");
        let discovery = Discovery::with_timeout(probe, Duration::from_millis(50));
        let best = discovery.find_best(Some("my-app")).await.expect("should find");
        assert_eq!(best.port, 3003);
    }

    #[tokio::test]
    async fn find_best_falls_back_to_youngest_when_no_match() {
        let probe = FakeHttpProbe::new();
        probe.set_response(3002, 200, "<title>unrelated</title>remotion");
        let discovery = Discovery::with_timeout(probe, Duration::from_millis(50));
        let best = discovery.find_best(Some("nonexistent-project")).await;
        assert!(best.is_some());
    }
}
