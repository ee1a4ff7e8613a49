// SPDX-License-Identifier: MIT

//! fleet-port: C1, cross-platform "who owns port P?" / "is P bindable?"
//!
//! Modeled as a capability with a pluggable back-end (spec §9 design
//! note), the same shape as the teacher's `AgentAdapter` trait with
//! `coop`/`docker`/`k8s` implementations: [`PortBackend`] is the seam,
//! [`SystemBackend`] is the real cross-platform implementation, and tests
//! substitute [`fake::FakeBackend`] driven by a scripted process table.

mod backend;
#[cfg(any(test, feature = "test-support"))]
mod fake;
mod inspector;
mod protection;

pub use backend::{BackendError, PortBackend, PortHolder, SystemBackend};
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBackend;
pub use inspector::{AvailabilityResult, PortInspector, SafetyCheck};
pub use protection::{DefaultProtectionPolicy, ProtectionPolicy};

use serde::{Deserialize, Serialize};

/// `{ port, holder_pid, holder_name, is_system_service, is_node_like }`
/// per spec §3. Transient — never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub port: u16,
    pub holder_pid: Option<u32>,
    pub holder_name: Option<String>,
    pub is_system_service: bool,
    pub is_node_like: bool,
}
