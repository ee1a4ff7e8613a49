// SPDX-License-Identifier: MIT

//! [`Registry`]: the C4 public contract over C2/C3 — tracks every studio
//! the controller knows about, reconciling live OS/HTTP state against the
//! persisted document on every read, per spec §4.4.

use crate::metadata;
use crate::model::{RegistryDocument, StudioInstance};
use crate::store::RegistryStore;
use fleet_core::{
    Clock, EventFilter, EventReceiver, EventSink, FleetConfig, FleetError, FleetErrorKind, FleetEvent,
    StudioStatus, SystemClock,
};
use fleet_discovery::{Discovery, DiscoveredStudio, HttpProbe, RealHttpProbe};
use fleet_lifecycle::{LaunchRequest, LifecycleEngine, ShutdownTarget};
use fleet_port::{DefaultProtectionPolicy, PortBackend, PortInspector, ProtectionPolicy, SystemBackend};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Result of [`Registry::adopt`]. A port already tracked is a conflict
/// rather than an error, per spec §4.4's *Idempotence of adoption* law.
#[derive(Debug, Clone)]
pub enum AdoptOutcome {
    Adopted(StudioInstance),
    Conflict { port: u16 },
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub newly_adopted: Vec<u16>,
    pub cleaned: Vec<u16>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KillOrphansReport {
    pub killed: Vec<u16>,
    pub errors: Vec<String>,
}

/// One-shot sweep result of [`Registry::health_check`]. `recovered` is
/// always empty here: the registry holds no history across calls to judge
/// a transition against, only the Health Monitor (C5) tracks that.
#[derive(Debug, Clone, Default)]
pub struct HealthCheckReport {
    pub healthy: Vec<u16>,
    pub unhealthy: Vec<u16>,
    pub recovered: Vec<u16>,
    pub per_port: HashMap<u16, bool>,
}

struct RegistryState {
    instances: HashMap<u16, StudioInstance>,
    store: RegistryStore,
}

impl RegistryState {
    fn persist(&self) -> Result<(), FleetError> {
        let mut instances: Vec<StudioInstance> = self.instances.values().cloned().collect();
        instances.sort_by_key(|i| i.port);
        let document = RegistryDocument { last_updated: chrono::Utc::now(), instances };
        self.store.save(&document)
    }
}

/// Owns the persisted document and the single mutex serializing every
/// mutation, per spec §5's "registry mutex protecting the in-memory map
/// and the persistence file" — one lock, not two.
pub struct Registry<
    B: PortBackend = SystemBackend,
    Pol: ProtectionPolicy = DefaultProtectionPolicy,
    Pr: HttpProbe = RealHttpProbe,
    C: Clock = SystemClock,
> {
    state: Mutex<RegistryState>,
    lifecycle: Arc<LifecycleEngine<B, Pol, Pr>>,
    discovery: Arc<Discovery<Pr>>,
    port: Arc<PortInspector<B, Pol>>,
    config: Arc<FleetConfig>,
    clock: C,
    events: EventSink,
}

impl<B: PortBackend, Pol: ProtectionPolicy, Pr: HttpProbe, C: Clock> Registry<B, Pol, Pr, C> {
    /// Loads the registry file (or starts empty), probes every loaded
    /// entry for liveness, and drops the dead ones before returning, per
    /// spec §4.4's "Persistence" contract.
    pub async fn open(
        path: impl Into<PathBuf>,
        lifecycle: Arc<LifecycleEngine<B, Pol, Pr>>,
        discovery: Arc<Discovery<Pr>>,
        port: Arc<PortInspector<B, Pol>>,
        config: Arc<FleetConfig>,
        clock: C,
    ) -> Result<Self, FleetError> {
        let (store, document) = RegistryStore::open(path)?;
        let instances = document.instances.into_iter().map(|i| (i.port, i)).collect();
        let registry = Self {
            state: Mutex::new(RegistryState { instances, store }),
            lifecycle,
            discovery,
            port,
            config,
            clock,
            events: EventSink::new(),
        };
        registry.prune_all().await;
        Ok(registry)
    }

    /// Subscribes to this registry's `studioLaunched`/`studioAdopted`/
    /// `studioStopped` events, per spec §6.
    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        self.events.subscribe(filter)
    }

    /// Implements spec §4.4's branching launch contract: a directed
    /// request (new port, or forced) is authoritative; otherwise prefer a
    /// live responder over spawning a new process. Tagged with a short
    /// correlation id so the discovery, port-selection, and spawn log
    /// lines this one call fans out to can be grepped together.
    pub async fn smart_launch(
        &self,
        project_path: &Path,
        project_name: Option<&str>,
        requested_port: Option<u16>,
        force_new_port: bool,
    ) -> Result<(StudioInstance, bool), FleetError> {
        let correlation_id = fleet_core::short_id();
        let span = tracing::info_span!("smart_launch", correlation_id = %correlation_id, project = %project_path.display());
        self.smart_launch_inner(project_path, project_name, requested_port, force_new_port)
            .instrument(span)
            .await
    }

    async fn smart_launch_inner(
        &self,
        project_path: &Path,
        project_name: Option<&str>,
        requested_port: Option<u16>,
        force_new_port: bool,
    ) -> Result<(StudioInstance, bool), FleetError> {
        let resolved_name =
            project_name.map(|s| s.to_string()).unwrap_or_else(|| project_name_from_path(project_path));

        if force_new_port || requested_port.is_some() {
            // A directed relaunch supersedes any existing tracked instance
            // of this same project, even one sitting on a different port
            // (the "forced new port" scenario stops the old instance
            // outright rather than leaving it orphaned), and also frees
            // `requested_port` if some other project currently holds it.
            let path_str = project_path.display().to_string();
            let stale_ports: Vec<u16> = {
                let state = self.state.lock();
                state.instances.values().filter(|i| i.project_path == path_str).map(|i| i.port).collect()
            };
            for port in stale_ports {
                self.stop(port).await?;
            }
            if let Some(port) = requested_port {
                if self.is_tracked(port) {
                    self.stop(port).await?;
                }
            }
            let mut request = LaunchRequest::new(project_path).force_new(true);
            if let Some(port) = requested_port {
                request = request.preferred_port(port);
            }
            return self.directed_launch(request, &resolved_name).await;
        }

        if let Some(adopted) = self.try_adopt_responder(Some(&resolved_name)).await? {
            return Ok(adopted);
        }
        if let Some(adopted) = self.try_adopt_responder(None).await? {
            return Ok(adopted);
        }

        let mut request = LaunchRequest::new(project_path);
        if let Some(last_port) = metadata::load(project_path).map(|m| m.last_port) {
            request = request.preferred_port(last_port);
        }
        self.directed_launch(request, &resolved_name).await
    }

    /// Refuses (returns [`AdoptOutcome::Conflict`]) if `discovered.port` is
    /// already tracked; otherwise records it with `pid` possibly zero, per
    /// the documented unknown-pid sentinel.
    pub async fn adopt(&self, discovered: DiscoveredStudio) -> Result<AdoptOutcome, FleetError> {
        if self.is_tracked(discovered.port) {
            return Ok(AdoptOutcome::Conflict { port: discovered.port });
        }
        let project_name = discovered.project_hint.clone().unwrap_or_else(|| "unknown".to_string());
        let instance = StudioInstance::new(
            discovered.pid_hint.unwrap_or(0),
            discovered.port,
            String::new(),
            project_name,
            self.clock.epoch_ms(),
            StudioStatus::Running,
        );

        let mut state = self.state.lock();
        state.instances.insert(discovered.port, instance.clone());
        state.persist()?;
        drop(state);
        self.events.publish(FleetEvent::StudioAdopted {
            port: instance.port,
            pid: instance.pid,
            project_hint: discovered.project_hint,
        });
        Ok(AdoptOutcome::Adopted(instance))
    }

    /// Asks C3 to shut down the tracked process, falling back to a direct
    /// port kill for instances adopted (not spawned) by this process, then
    /// removes the entry regardless of kill outcome.
    pub async fn stop(&self, port: u16) -> Result<bool, FleetError> {
        let Some(instance) = self.state.lock().instances.get(&port).cloned() else {
            return Ok(false);
        };

        let shutdown = self.lifecycle.shutdown(ShutdownTarget::Port(port), false).await;
        let mut killed = !shutdown.killed.is_empty();
        let mut forced = false;
        if !killed && instance.has_known_pid() {
            forced = true;
            killed = self.port.kill_on_port(port, false).await.unwrap_or(false);
        }

        let mut state = self.state.lock();
        state.instances.remove(&port);
        state.persist()?;
        drop(state);
        self.events.publish(FleetEvent::StudioStopped { port, pid: instance.pid, forced });
        Ok(killed)
    }

    /// `stop` then relaunch the same project on the same port.
    pub async fn restart(&self, port: u16) -> Result<StudioInstance, FleetError> {
        let instance = self.instance(port).await.ok_or_else(|| {
            FleetError::new(FleetErrorKind::InvalidProject, port.to_string(), "no tracked instance on that port")
        })?;
        self.stop(port).await?;
        let project_path = PathBuf::from(&instance.project_path);
        let (instance, _) =
            self.smart_launch(&project_path, Some(&instance.project_name), Some(port), true).await?;
        Ok(instance)
    }

    /// Stale entries are pruned before the snapshot is taken, per spec
    /// §4.4 ("stale entries... removed in-line").
    pub async fn instances(&self) -> Vec<StudioInstance> {
        self.prune_all().await;
        let mut instances: Vec<StudioInstance> = self.state.lock().instances.values().cloned().collect();
        instances.sort_by_key(|i| i.port);
        instances
    }

    pub async fn instance(&self, port: u16) -> Option<StudioInstance> {
        self.prune_port(port).await;
        self.state.lock().instances.get(&port).cloned()
    }

    pub async fn status(&self) -> Vec<StudioInstance> {
        self.instances().await
    }

    /// Full reconciliation pass: prune dead entries, then adopt any
    /// responder C2 sees that isn't already tracked.
    pub async fn refresh_discovery(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        let before: Vec<u16> = self.state.lock().instances.keys().copied().collect();
        self.prune_all().await;
        let after: Vec<u16> = self.state.lock().instances.keys().copied().collect();
        report.cleaned = before.into_iter().filter(|p| !after.contains(p)).collect();

        for studio in self.discovery.discover(None).await {
            if self.is_tracked(studio.port) {
                continue;
            }
            match self.adopt(studio.clone()).await {
                Ok(AdoptOutcome::Adopted(_)) => report.newly_adopted.push(studio.port),
                Ok(AdoptOutcome::Conflict { .. }) => {}
                Err(e) => report.errors.push(e.to_string()),
            }
        }
        report
    }

    /// Kills responders C2 sees that this registry does not track.
    pub async fn kill_orphans(&self) -> KillOrphansReport {
        let mut report = KillOrphansReport::default();
        for studio in self.discovery.discover(None).await {
            if self.is_tracked(studio.port) {
                continue;
            }
            match self.port.kill_on_port(studio.port, true).await {
                Ok(true) => report.killed.push(studio.port),
                Ok(false) => report.errors.push(format!("refused to kill protected process on port {}", studio.port)),
                Err(e) => report.errors.push(format!("port {}: {e}", studio.port)),
            }
        }
        report
    }

    /// One-shot HTTP probe of every tracked entry.
    pub async fn health_check(&self) -> HealthCheckReport {
        let mut report = HealthCheckReport::default();
        for port in self.instances().await.into_iter().map(|i| i.port) {
            let ok = matches!(
                self.discovery.head(port, self.config.http_timeout).await,
                Ok(status) if (200..500).contains(&status)
            );
            report.per_port.insert(port, ok);
            if ok {
                report.healthy.push(port);
            } else {
                report.unhealthy.push(port);
            }
        }
        report
    }

    async fn directed_launch(
        &self,
        request: LaunchRequest,
        project_name: &str,
    ) -> Result<(StudioInstance, bool), FleetError> {
        let project_path = request.project_path.clone();
        let result = self.lifecycle.launch(request).await?;
        let instance = self.record_spawn(result.port, result.pid, &project_path, project_name);
        if !result.reused {
            let _ = metadata::record_launch(&project_path, project_name, result.port);
        }
        self.events.publish(FleetEvent::StudioLaunched {
            port: result.port,
            pid: result.pid,
            project_path: project_path.display().to_string(),
            reused: result.reused,
        });
        Ok((instance, result.reused))
    }

    /// Looks for a live responder (matching `preferred_project` if given)
    /// and adopts it if not already tracked, returning `was_reused=true`
    /// either way a match is found.
    async fn try_adopt_responder(
        &self,
        preferred_project: Option<&str>,
    ) -> Result<Option<(StudioInstance, bool)>, FleetError> {
        let Some(found) = self.discovery.find_best(preferred_project).await else {
            return Ok(None);
        };
        if let Some(existing) = self.instance(found.port).await {
            return Ok(Some((existing, true)));
        }
        match self.adopt(found).await? {
            AdoptOutcome::Adopted(instance) => Ok(Some((instance, true))),
            AdoptOutcome::Conflict { port } => Ok(self.instance(port).await.map(|i| (i, true))),
        }
    }

    fn record_spawn(&self, port: u16, pid: u32, project_path: &Path, project_name: &str) -> StudioInstance {
        let instance = StudioInstance::new(
            pid,
            port,
            project_path.display().to_string(),
            project_name,
            self.clock.epoch_ms(),
            StudioStatus::Running,
        );
        let mut state = self.state.lock();
        state.instances.insert(port, instance.clone());
        let _ = state.persist();
        instance
    }

    /// Updates a tracked instance's `pid`/`status` after the Health Monitor
    /// recovers it by calling C3 directly (bypassing `smart_launch`, per
    /// spec §4.5's `attempt_recovery` contract). Does nothing if the port
    /// is no longer tracked.
    pub async fn reconcile_after_recovery(&self, port: u16, new_pid: u32) -> Option<StudioInstance> {
        let mut state = self.state.lock();
        let instance = state.instances.get_mut(&port)?;
        instance.pid = new_pid;
        instance.status = StudioStatus::Running;
        let updated = instance.clone();
        let _ = state.persist();
        Some(updated)
    }

    fn is_tracked(&self, port: u16) -> bool {
        self.state.lock().instances.contains_key(&port)
    }

    /// `pid == 0` instances fall back to HTTP discovery; otherwise the pid
    /// must still be the reported holder of the port, per the §4.4
    /// liveness contract (a different pid on the same port is also dead).
    /// A spawned instance's pid is its launcher process, not necessarily
    /// the process holding the port directly (`npx remotion studio`
    /// forks the actual dev server), so liveness is decided by the OS
    /// reporting the pid itself alive — not by the port's current holder
    /// matching it.
    async fn is_alive(&self, instance: &StudioInstance) -> bool {
        if !instance.has_known_pid() {
            return self.discovery.identify(instance.port).await.is_some();
        }
        self.port.is_alive(instance.pid).await
    }

    async fn prune_all(&self) {
        let candidates: Vec<StudioInstance> = self.state.lock().instances.values().cloned().collect();
        self.prune_candidates(candidates).await;
    }

    async fn prune_port(&self, port: u16) {
        let candidate = self.state.lock().instances.get(&port).cloned();
        if let Some(instance) = candidate {
            self.prune_candidates(vec![instance]).await;
        }
    }

    async fn prune_candidates(&self, candidates: Vec<StudioInstance>) {
        let mut dead_ports = Vec::new();
        for instance in &candidates {
            if !self.is_alive(instance).await {
                dead_ports.push(instance.port);
            }
        }
        if dead_ports.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        for port in &dead_ports {
            state.instances.remove(port);
        }
        let _ = state.persist();
    }
}

fn project_name_from_path(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("project").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FakeClock;
    use fleet_discovery::FakeHttpProbe;
    use fleet_lifecycle::StudioCommand;
    use fleet_port::FakeBackend;

    struct ShellStudioCommand;
    impl StudioCommand for ShellStudioCommand {
        fn build(&self, _project_path: &Path, _port: u16) -> (String, Vec<String>) {
            ("/bin/sh".to_string(), vec!["-c".to_string(), "echo server running; sleep 5".to_string()])
        }
    }

    fn make_project(dir: &Path) {
        std::fs::write(dir.join("package.json"), "{}").unwrap();
    }

    async fn make_registry(
        registry_dir: &Path,
    ) -> (Registry<FakeBackend, DefaultProtectionPolicy, FakeHttpProbe, FakeClock>, FakeHttpProbe, FakeBackend) {
        let config = Arc::new(FleetConfig::defaults());
        let backend = FakeBackend::new();
        let port = Arc::new(PortInspector::new(backend.clone(), config.clone()));
        let probe = FakeHttpProbe::new();
        let discovery = Arc::new(Discovery::new(probe.clone()));
        let command: Arc<dyn StudioCommand> = Arc::new(ShellStudioCommand);
        let lifecycle = Arc::new(LifecycleEngine::with_command(port.clone(), discovery.clone(), command));
        let registry_path = registry_dir.join(".studio-registry.json");
        let registry = Registry::open(registry_path, lifecycle, discovery, port, config, FakeClock::new())
            .await
            .unwrap();
        (registry, probe, backend)
    }

    #[tokio::test]
    async fn smart_launch_cold_launch_creates_tracked_instance() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (registry, _probe, backend) = make_registry(assets.path()).await;

        let (instance, reused) =
            registry.smart_launch(project.path(), Some("alpha"), None, false).await.unwrap();
        assert!(!reused);
        assert!(instance.port >= 3002 && instance.port <= 3100);
        backend.set_holder(instance.port, instance.pid, "node");
        assert_eq!(registry.instances().await.len(), 1);
    }

    #[tokio::test]
    async fn smart_launch_warm_reuse_returns_tracked_instance() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (registry, probe, backend) = make_registry(assets.path()).await;

        let (first, _) = registry.smart_launch(project.path(), Some("alpha"), None, false).await.unwrap();
        backend.set_holder(first.port, first.pid, "node");
        probe.set_response(first.port, 200, "<title>alpha</title>remotion");

        let (second, reused) =
            registry.smart_launch(project.path(), Some("alpha"), None, false).await.unwrap();
        assert!(reused);
        assert_eq!(second.port, first.port);
        assert_eq!(registry.instances().await.len(), 1);
    }

    #[tokio::test]
    async fn smart_launch_forced_new_port_stops_previous_instance() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (registry, _probe, backend) = make_registry(assets.path()).await;

        let (first, _) = registry.smart_launch(project.path(), Some("alpha"), None, false).await.unwrap();
        backend.set_holder(first.port, first.pid, "node");
        let new_port = if first.port == 3099 { 3098 } else { first.port + 1 };

        let (second, reused) = registry
            .smart_launch(project.path(), Some("alpha"), Some(new_port), true)
            .await
            .unwrap();
        assert!(!reused);
        assert_eq!(second.port, new_port);
        backend.set_holder(new_port, second.pid, "node");
        let instances = registry.instances().await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].port, new_port);
    }

    #[tokio::test]
    async fn adopt_is_idempotent() {
        let assets = tempfile::tempdir().unwrap();
        let (registry, probe, _backend) = make_registry(assets.path()).await;
        probe.set_response(3050, 200, "<title>alpha</title>remotion");
        let discovered = DiscoveredStudio {
            port: 3050,
            pid_hint: None,
            responding: true,
            response_time_ms: Some(5),
            project_hint: Some("alpha".to_string()),
            discovery_method: fleet_discovery::DiscoveryMethod::HttpScan,
        };

        let first = registry.adopt(discovered.clone()).await.unwrap();
        assert!(matches!(first, AdoptOutcome::Adopted(_)));
        let second = registry.adopt(discovered).await.unwrap();
        assert!(matches!(second, AdoptOutcome::Conflict { port: 3050 }));
        assert_eq!(registry.instances().await.len(), 1);
    }

    #[tokio::test]
    async fn stop_removes_tracked_entry() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (registry, _probe, _backend) = make_registry(assets.path()).await;

        let (instance, _) = registry.smart_launch(project.path(), Some("alpha"), None, false).await.unwrap();
        let killed = registry.stop(instance.port).await.unwrap();
        assert!(killed);
        assert!(registry.instance(instance.port).await.is_none());
    }

    #[tokio::test]
    async fn health_check_reports_per_port_status() {
        let assets = tempfile::tempdir().unwrap();
        let (registry, probe, _backend) = make_registry(assets.path()).await;
        let discovered = DiscoveredStudio {
            port: 3060,
            pid_hint: None,
            responding: true,
            response_time_ms: Some(5),
            project_hint: Some("alpha".to_string()),
            discovery_method: fleet_discovery::DiscoveryMethod::HttpScan,
        };
        registry.adopt(discovered).await.unwrap();
        probe.set_response(3060, 200, "remotion studio ok");

        let report = registry.health_check().await;
        assert_eq!(report.healthy, vec![3060]);
        assert!(report.unhealthy.is_empty());
        assert!(report.recovered.is_empty());
    }

    #[tokio::test]
    async fn prune_on_read_drops_dead_adopted_entry() {
        let assets = tempfile::tempdir().unwrap();
        let (registry, _probe, _backend) = make_registry(assets.path()).await;
        let discovered = DiscoveredStudio {
            port: 3070,
            pid_hint: None,
            responding: true,
            response_time_ms: Some(5),
            project_hint: None,
            discovery_method: fleet_discovery::DiscoveryMethod::HttpScan,
        };
        registry.adopt(discovered).await.unwrap();

        // No fake HTTP response configured for 3070: discovery no longer
        // sees it respond, so a read should prune the stale entry.
        assert!(registry.instance(3070).await.is_none());
    }

    #[tokio::test]
    async fn kill_orphans_kills_untracked_responder() {
        let assets = tempfile::tempdir().unwrap();
        let (registry, probe, backend) = make_registry(assets.path()).await;
        probe.set_response(3080, 200, "<title>loose</title>remotion");
        backend.set_holder(3080, 999, "node");

        let report = registry.kill_orphans().await;
        assert_eq!(report.killed, vec![3080]);
        assert!(!backend.is_alive(999).await);
    }
}
