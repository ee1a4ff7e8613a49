// SPDX-License-Identifier: MIT

//! The public C1 contract: `is_available`, `find_available`, `inspect`,
//! `kill_on_port`, `validate_safety`, per spec §4.1. `kill_on_port` is the
//! operation §4.1 means by "kill" — it re-derives the holder's
//! classification from the port and refuses a system service. `kill` is
//! the lower-level primitive it's built on and does not itself consult
//! the protection policy; callers outside this crate must classify the
//! pid first (as `kill_on_port` does, or as `fleet-lifecycle` does by
//! only ever calling it on a pid it just spawned itself).

use crate::backend::{BackendError, PortBackend};
use crate::protection::{DefaultProtectionPolicy, ProtectionPolicy};
use crate::PortRecord;
use fleet_core::FleetConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of [`PortInspector::find_available`].
#[derive(Debug, Clone)]
pub struct AvailabilityResult {
    pub port: u16,
    pub available: bool,
    pub conflict: Option<PortRecord>,
}

/// Result of [`PortInspector::validate_safety`].
#[derive(Debug, Clone)]
pub struct SafetyCheck {
    pub safe: bool,
    pub reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    #[error("no free port in {min}..={max} (excluding reserved)")]
    NoFreePort { min: u16, max: u16 },
}

/// Owns the backend and the classification rules; the only place that
/// reasons about `RESERVED`, per SPEC_FULL's C1 design note.
pub struct PortInspector<B: PortBackend = crate::SystemBackend, P: ProtectionPolicy = DefaultProtectionPolicy> {
    backend: B,
    policy: P,
    config: Arc<FleetConfig>,
}

impl<B: PortBackend> PortInspector<B, DefaultProtectionPolicy> {
    pub fn new(backend: B, config: Arc<FleetConfig>) -> Self {
        Self { backend, policy: DefaultProtectionPolicy, config }
    }
}

impl<B: PortBackend, P: ProtectionPolicy> PortInspector<B, P> {
    pub fn with_policy(backend: B, policy: P, config: Arc<FleetConfig>) -> Self {
        Self { backend, policy, config }
    }

    /// `true` iff a loopback bind would succeed AND the OS reports no
    /// listener. Per spec §4.1 both checks are required — either alone
    /// has false positives under TIME_WAIT.
    pub async fn is_available(&self, port: u16) -> bool {
        let bindable = self.backend.bindable(port).await.unwrap_or(false);
        if !bindable {
            return false;
        }
        match self.backend.inspect(port).await {
            Ok(None) => true,
            Ok(Some(_)) => false,
            // OS-query error: per §4.1 failures are non-fatal and must not
            // falsely report the port as free.
            Err(e) => {
                warn!(port, error = %e, "port inspect failed, treating as unavailable");
                false
            }
        }
    }

    /// Returns the holder (pid, name, classification) or `None` if free or
    /// unqueryable (per §4.1, an OS-query error yields "unknown holder",
    /// which this surfaces as a conservative, fully-protected `PortRecord`
    /// rather than `None` — `None` here specifically means "nothing there").
    pub async fn inspect(&self, port: u16) -> Option<PortRecord> {
        match self.backend.inspect(port).await {
            Ok(Some(holder)) => Some(PortRecord {
                port,
                holder_pid: Some(holder.pid),
                holder_name: Some(holder.name.clone()),
                is_system_service: self.policy.is_system_service(Some(&holder.name)),
                is_node_like: self.policy.is_node_like(Some(&holder.name)),
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(port, error = %e, "port inspect failed, reporting unknown holder");
                Some(PortRecord {
                    port,
                    holder_pid: None,
                    holder_name: None,
                    is_system_service: self.policy.is_system_service(None),
                    is_node_like: false,
                })
            }
        }
    }

    /// If `preferred` is given and free, return it; otherwise scan
    /// `[min..max] \ reserved` in order for the first free port.
    pub async fn find_available(&self, preferred: Option<u16>) -> Result<AvailabilityResult, InspectorError> {
        if let Some(port) = preferred {
            if self.config.is_in_range(port) && self.is_available(port).await {
                return Ok(AvailabilityResult { port, available: true, conflict: None });
            }
            let conflict = self.inspect(port).await;
            info!(port, ?conflict, "preferred port unavailable, scanning range");
        }

        for port in self.config.min_port..=self.config.max_port {
            if self.config.reserved_ports.contains(&port) {
                continue;
            }
            if self.is_available(port).await {
                return Ok(AvailabilityResult { port, available: true, conflict: None });
            }
        }

        Err(InspectorError::NoFreePort { min: self.config.min_port, max: self.config.max_port })
    }

    /// Rejects `<1024`, out-of-range, and system-held ports.
    pub async fn validate_safety(&self, port: u16) -> SafetyCheck {
        if port < 1024 {
            return SafetyCheck { safe: false, reason: Some(format!("port {port} is a privileged port")) };
        }
        if !self.config.is_in_range(port) {
            return SafetyCheck {
                safe: false,
                reason: Some(format!(
                    "port {port} is outside the managed range {}..={}",
                    self.config.min_port, self.config.max_port
                )),
            };
        }
        if let Some(record) = self.inspect(port).await {
            if record.is_system_service {
                return SafetyCheck {
                    safe: false,
                    reason: Some(format!("port {port} is held by a system service ({:?})", record.holder_name)),
                };
            }
        }
        SafetyCheck { safe: true, reason: None }
    }

    /// Whether `pid` is still alive, regardless of what (if anything) it
    /// currently holds a port on.
    pub async fn is_alive(&self, pid: u32) -> bool {
        self.backend.is_alive(pid).await
    }

    /// Internal primitive: sends a graceful terminate, waits, and
    /// optionally escalates. Does not consult the protection policy —
    /// this pid has no associated port here to classify, so the caller
    /// must already know it's safe to kill. Not the §4.1 `kill` contract
    /// op; use [`PortInspector::kill_on_port`] for that.
    pub async fn kill(&self, pid: u32, force: bool) -> Result<bool, BackendError> {
        if !self.backend.is_alive(pid).await {
            return Ok(true);
        }
        self.backend.terminate(pid, force).await
    }

    /// Kill a pid known to be the holder of `port`, honoring the
    /// protection policy. This is the variant C3/C4/C5 should prefer —
    /// it re-derives the classification from the port itself.
    pub async fn kill_on_port(&self, port: u16, force: bool) -> Result<bool, BackendError> {
        let Some(record) = self.inspect(port).await else {
            return Ok(true);
        };
        if record.is_system_service {
            warn!(port, "refusing to kill system service holder");
            return Ok(false);
        }
        let Some(pid) = record.holder_pid else {
            return Ok(true);
        };
        self.kill(pid, force).await
    }
}
