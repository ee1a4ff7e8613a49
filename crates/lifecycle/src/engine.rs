// SPDX-License-Identifier: MIT

//! [`LifecycleEngine`]: the C3 public contract — `launch`, `shutdown`,
//! `status` — wiring port selection (`fleet-port`), reuse/validation
//! checks (`fleet-discovery`), and the spawn/readiness primitive in
//! `spawn.rs`.

use crate::command::{DefaultStudioCommand, StudioCommand};
use crate::spawn::{spawn_and_watch, LaunchRequest, ProcessState};
use crate::MAX_STARTUP_ATTEMPTS;
use fleet_core::{FleetError, FleetErrorKind};
use fleet_discovery::{Discovery, DiscoveredStudio, HttpProbe};
use fleet_port::{DefaultProtectionPolicy, PortBackend, PortInspector, ProtectionPolicy, SystemBackend};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Successful result of [`LifecycleEngine::launch`].
#[derive(Debug, Clone)]
pub struct LaunchResult {
    pub port: u16,
    pub pid: u32,
    pub reused: bool,
    pub warning: Option<String>,
}

/// Which processes a [`LifecycleEngine::shutdown`] call targets.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownTarget {
    Port(u16),
    Pid(u32),
    All,
}

/// Result of [`LifecycleEngine::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    pub killed: Vec<u32>,
    pub errors: Vec<String>,
}

/// Result of [`LifecycleEngine::status`], per spec §4.3.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub managed: usize,
    pub active: Vec<DiscoveredStudio>,
    pub orphans: Vec<u32>,
}

struct ManagedProcess {
    pid: u32,
    #[allow(dead_code)]
    state: ProcessState,
}

/// Owns the engine's own pid set and reconciles it against C2's live view
/// on `status()`. Generic over the port backend, protection policy, and
/// HTTP probe so tests can substitute fakes end to end.
pub struct LifecycleEngine<
    B: PortBackend = SystemBackend,
    Pol: ProtectionPolicy = DefaultProtectionPolicy,
    Pr: HttpProbe = fleet_discovery::RealHttpProbe,
> {
    port: Arc<PortInspector<B, Pol>>,
    discovery: Arc<Discovery<Pr>>,
    command: Arc<dyn StudioCommand>,
    managed: Mutex<HashMap<u16, ManagedProcess>>,
}

impl<B: PortBackend, Pol: ProtectionPolicy, Pr: HttpProbe> LifecycleEngine<B, Pol, Pr> {
    pub fn new(port: Arc<PortInspector<B, Pol>>, discovery: Arc<Discovery<Pr>>) -> Self {
        Self { port, discovery, command: Arc::new(DefaultStudioCommand), managed: Mutex::new(HashMap::new()) }
    }

    pub fn with_command(
        port: Arc<PortInspector<B, Pol>>,
        discovery: Arc<Discovery<Pr>>,
        command: Arc<dyn StudioCommand>,
    ) -> Self {
        Self { port, discovery, command, managed: Mutex::new(HashMap::new()) }
    }

    /// Implements spec §4.3's six-step `launch` algorithm plus retry.
    pub async fn launch(&self, request: LaunchRequest) -> Result<LaunchResult, FleetError> {
        validate_project(&request.project_path)?;

        if !request.force_new {
            let project_name = project_name_from_path(&request.project_path);
            if let Some(found) = self.discovery.find_best(Some(&project_name)).await {
                if found.responding {
                    if let Some(pid) = found.pid_hint {
                        return Ok(LaunchResult { port: found.port, pid, reused: true, warning: None });
                    }
                }
            }
        }

        let mut last_err: Option<FleetError> = None;
        for attempt in 1..=MAX_STARTUP_ATTEMPTS {
            let (port, warning) = match self.select_port(request.preferred_port, request.force_new).await {
                Ok(v) => v,
                Err(e) if !e.kind.is_retryable() => return Err(e),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };

            match spawn_and_watch(self.command.as_ref(), &request.project_path, port, request.timeout).await {
                Ok(outcome) => {
                    if request.validate {
                        if let Err(e) = self.validate_http(port, request.timeout).await {
                            let _ = self.port.kill(outcome.pid, true).await;
                            last_err = Some(e);
                            warn!(attempt, port, "launch validation failed, retrying");
                            continue;
                        }
                    }
                    self.managed.lock().insert(port, ManagedProcess { pid: outcome.pid, state: ProcessState::Running });
                    return Ok(LaunchResult { port, pid: outcome.pid, reused: false, warning });
                }
                Err(e) => {
                    if !e.kind.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, port, "launch attempt failed, retrying");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FleetError::new(
                FleetErrorKind::SpawnFailure,
                request.project_path.display().to_string(),
                "exhausted startup attempts",
            )
        }))
    }

    /// Resolves targets via the engine's own managed set, then asks
    /// `fleet-port` to kill each — never killing a system service.
    pub async fn shutdown(&self, target: ShutdownTarget, force: bool) -> ShutdownResult {
        let targets: Vec<(u16, u32)> = {
            let managed = self.managed.lock();
            match target {
                ShutdownTarget::Port(port) => {
                    managed.get(&port).map(|m| vec![(port, m.pid)]).unwrap_or_default()
                }
                ShutdownTarget::Pid(pid) => {
                    managed.iter().filter(|(_, m)| m.pid == pid).map(|(p, m)| (*p, m.pid)).collect()
                }
                ShutdownTarget::All => managed.iter().map(|(p, m)| (*p, m.pid)).collect(),
            }
        };

        let mut result = ShutdownResult::default();
        for (port, pid) in targets {
            match self.port.kill_on_port(port, force).await {
                Ok(true) => {
                    result.killed.push(pid);
                    self.managed.lock().remove(&port);
                }
                Ok(false) => result.errors.push(format!("refused to kill protected process on port {port}")),
                Err(e) => result.errors.push(format!("port {port}: {e}")),
            }
        }
        result
    }

    /// Reconciles the engine's own pid set against C2's current view.
    pub async fn status(&self) -> StatusReport {
        let managed_ports: Vec<u16> = self.managed.lock().keys().copied().collect();
        let active = self.discovery.discover(None).await;

        let mut orphans = Vec::new();
        for studio in &active {
            if managed_ports.contains(&studio.port) {
                continue;
            }
            if let Some(record) = self.port.inspect(studio.port).await {
                if let Some(pid) = record.holder_pid {
                    orphans.push(pid);
                }
            }
        }

        StatusReport { managed: managed_ports.len(), active, orphans }
    }

    /// `directed` distinguishes an explicit caller request (reject an
    /// unsafe `preferred` outright) from a remembered-port hint (fall
    /// back to scanning instead), per spec §7's `UnsafePort` contract.
    async fn select_port(
        &self,
        preferred: Option<u16>,
        directed: bool,
    ) -> Result<(u16, Option<String>), FleetError> {
        if let (Some(port), true) = (preferred, directed) {
            let safety = self.port.validate_safety(port).await;
            if !safety.safe {
                return Err(FleetError::unsafe_port(
                    port,
                    safety.reason.unwrap_or_else(|| "preferred port is unsafe".to_string()),
                ));
            }
        }

        let result = self
            .port
            .find_available(preferred)
            .await
            .map_err(|e| FleetError::no_free_port(e.to_string()))?;

        let warning = match preferred {
            Some(p) if p != result.port => {
                Some(format!("preferred port {p} unavailable, substituted {}", result.port))
            }
            _ => None,
        };
        Ok((result.port, warning))
    }

    async fn validate_http(&self, port: u16, timeout: Duration) -> Result<(), FleetError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(status) = self.discovery.head(port, Duration::from_secs(2)).await {
                if (200..500).contains(&status) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(FleetError::new(
                    FleetErrorKind::ValidationTimeout,
                    port.to_string(),
                    format!("no 2xx-4xx response within {timeout:?}"),
                ));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

fn validate_project(path: &Path) -> Result<(), FleetError> {
    if !path.is_dir() {
        return Err(FleetError::invalid_project(path.display().to_string(), "not an existing directory"));
    }
    if !path.join("package.json").exists() {
        return Err(FleetError::invalid_project(path.display().to_string(), "missing package.json manifest"));
    }
    Ok(())
}

fn project_name_from_path(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("project").to_string()
}
