// SPDX-License-Identifier: MIT

//! Error taxonomy shared across every component, per spec §7.
//!
//! Each component crate still defines its own local `thiserror` enum for
//! the failures that are purely internal to it (e.g. `fleet-port`'s
//! `PortBackendError`), the way the teacher's `AgentAdapterError` and
//! `LifecycleError` stay local to their crates. `FleetError` is the
//! boundary type: the one every component maps into when a failure needs
//! to be surfaced to a caller outside the component, carrying `kind`,
//! `entity`, and a human message as required by §7's "structured error
//! object" propagation policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The taxonomy of failure kinds named in spec §7. These are classification
/// tags, not distinct Rust types — `FleetError` is the single carrier type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetErrorKind {
    InvalidProject,
    UnsafePort,
    NoFreePort,
    SpawnFailure,
    ReadinessTimeout,
    ValidationTimeout,
    ProcessGone,
    HealthProbeFailure,
    RecoveryExhausted,
    PersistenceFailure,
}

impl FleetErrorKind {
    /// Whether the engine should retry on this failure, per §7's
    /// propagation policy table. `InvalidProject`, `UnsafePort`, and
    /// `NoFreePort` are surfaced immediately; the three startup failures
    /// are retried up to `MAX_STARTUP_ATTEMPTS`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SpawnFailure | Self::ReadinessTimeout | Self::ValidationTimeout)
    }

    /// Maps to the §6 CLI exit code table. Kinds with no explicit entry in
    /// the table fall back to 1 (generic failure).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidProject => 2,
            Self::NoFreePort => 3,
            Self::SpawnFailure | Self::ReadinessTimeout | Self::ValidationTimeout => 4,
            Self::RecoveryExhausted => 5,
            _ => 1,
        }
    }
}

/// A structured error carrying `kind`, the entity it happened to
/// (a port, a project path, a pid — whatever is most useful to log), and a
/// human-readable message. Never panics the process; components that hit
/// this return it to their caller rather than unwinding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetError {
    pub kind: FleetErrorKind,
    pub entity: String,
    pub message: String,
}

impl FleetError {
    pub fn new(kind: FleetErrorKind, entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind, entity: entity.into(), message: message.into() }
    }

    pub fn invalid_project(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::new(FleetErrorKind::InvalidProject, path, reason.to_string())
    }

    pub fn unsafe_port(port: u16, reason: impl fmt::Display) -> Self {
        Self::new(FleetErrorKind::UnsafePort, port.to_string(), reason.to_string())
    }

    pub fn no_free_port(range: impl fmt::Display) -> Self {
        Self::new(FleetErrorKind::NoFreePort, "port-range", format!("no free port in {range}"))
    }

    pub fn persistence(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::new(FleetErrorKind::PersistenceFailure, path, reason.to_string())
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.entity, self.message)
    }
}

impl std::error::Error for FleetError {}
