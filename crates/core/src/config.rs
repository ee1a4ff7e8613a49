// SPDX-License-Identifier: MIT

//! Fleet-wide configuration, read once from environment variables per
//! spec §6 ("Environment variables honored"). Defaults match §3's
//! invariant 3 and §4.5's configuration table.

use std::collections::BTreeSet;
use std::time::Duration;

fn env_u16(name: &str, default: u16) -> u16 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name).as_deref() {
        Ok("1") => true,
        Ok("0") => false,
        _ => default,
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn parse_reserved(raw: &str) -> BTreeSet<u16> {
    raw.split(',').filter_map(|s| s.trim().parse().ok()).collect()
}

/// Fleet-wide tunables. Constructed once via [`FleetConfig::from_env`] and
/// shared (by value — it's small and `Copy`-free but cheap to clone) by
/// every component that needs one of these knobs.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub min_port: u16,
    pub max_port: u16,
    pub reserved_ports: BTreeSet<u16>,
    pub auto_recover: bool,
    pub health_interval: Duration,
    pub http_timeout: Duration,
    pub failure_threshold: u32,
    pub max_recovery_attempts: u32,
    pub recovery_delay: Duration,
    pub max_startup_attempts: u32,
}

impl FleetConfig {
    /// Defaults per spec §3 (port range) and §4.5 (health/recovery
    /// tunables), before any environment overrides are applied.
    pub fn defaults() -> Self {
        let mut reserved = BTreeSet::new();
        reserved.insert(3001);
        Self {
            min_port: 3002,
            max_port: 3100,
            reserved_ports: reserved,
            auto_recover: true,
            health_interval: Duration::from_secs(30),
            http_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            max_recovery_attempts: 3,
            recovery_delay: Duration::from_secs(60),
            max_startup_attempts: 3,
        }
    }

    /// Build config from defaults overridden by the environment variables
    /// named in spec §6: `MIN_PORT`, `MAX_PORT`, `RESERVED_PORTS`
    /// (comma list), `AUTO_RECOVER` (`0|1`), `HEALTH_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let mut cfg = Self::defaults();
        cfg.min_port = env_u16("MIN_PORT", cfg.min_port);
        cfg.max_port = env_u16("MAX_PORT", cfg.max_port);
        if let Ok(raw) = std::env::var("RESERVED_PORTS") {
            cfg.reserved_ports.extend(parse_reserved(&raw));
        }
        cfg.auto_recover = env_bool("AUTO_RECOVER", cfg.auto_recover);
        cfg.health_interval = env_millis("HEALTH_INTERVAL_MS", cfg.health_interval);
        cfg
    }

    /// Whether `port` is eligible for selection at all (in-range and not
    /// administratively reserved), per spec §3 invariant 3. Does not check
    /// OS-level availability — that is `fleet-port`'s job.
    pub fn is_in_range(&self, port: u16) -> bool {
        port >= self.min_port && port <= self.max_port && !self.reserved_ports.contains(&port)
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_port_range() {
        let cfg = FleetConfig::defaults();
        assert_eq!(cfg.min_port, 3002);
        assert_eq!(cfg.max_port, 3100);
        assert!(cfg.reserved_ports.contains(&3001));
    }

    #[test]
    fn is_in_range_excludes_reserved() {
        let cfg = FleetConfig::defaults();
        assert!(!cfg.is_in_range(3001));
        assert!(cfg.is_in_range(3002));
        assert!(!cfg.is_in_range(3101));
    }

    #[test]
    fn parse_reserved_ignores_garbage_tokens() {
        let set = parse_reserved("3015, notaport ,3020");
        assert_eq!(set, BTreeSet::from([3015, 3020]));
    }
}
