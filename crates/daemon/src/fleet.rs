// SPDX-License-Identifier: MIT

//! [`Fleet`]: wires the five components together the way the teacher's
//! `lifecycle::startup` wires `RuntimeRouter`, `Wal`, and `Runtime`. This
//! is the one handle an embedding process needs — launch, stop, status,
//! discover, health, reset, all delegate straight through to C3-C5.

use fleet_core::{Clock, EventFilter, EventReceiver, FleetConfig, FleetError, SystemClock};
use fleet_discovery::{DiscoveredStudio, Discovery, HttpProbe, RealHttpProbe};
use fleet_health::{HealthMonitor, HealthRecord, HealthReport};
use fleet_lifecycle::{DefaultStudioCommand, LaunchRequest, LifecycleEngine, StudioCommand};
use fleet_port::{DefaultProtectionPolicy, PortBackend, PortInspector, ProtectionPolicy, SystemBackend};
use fleet_registry::{KillOrphansReport, Registry, RefreshReport, StudioInstance};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// The assembled controller, generic over the same four seams as its
/// component crates so integration tests can drive the whole stack
/// through fakes. Production code uses the default type parameters
/// (`SystemBackend`, `DefaultProtectionPolicy`, `RealHttpProbe`,
/// `SystemClock`), aliased as [`Fleet`].
pub struct FleetController<
    B: PortBackend = SystemBackend,
    Pol: ProtectionPolicy = DefaultProtectionPolicy,
    Pr: HttpProbe = RealHttpProbe,
    C: Clock = SystemClock,
> {
    config: Arc<FleetConfig>,
    port: Arc<PortInspector<B, Pol>>,
    discovery: Arc<Discovery<Pr>>,
    lifecycle: Arc<LifecycleEngine<B, Pol, Pr>>,
    registry: Arc<Registry<B, Pol, Pr, C>>,
    health: Arc<HealthMonitor<B, Pol, Pr, C>>,
}

impl<B, Pol, Pr, C> FleetController<B, Pol, Pr, C>
where
    B: PortBackend + 'static,
    Pol: ProtectionPolicy + 'static,
    Pr: HttpProbe + 'static,
    C: Clock,
{
    /// Assembles every component over the given backends and starts the
    /// health monitor's background sweep, per spec §4.5. `registry_path`
    /// is the fixed on-disk location of `.studio-registry.json` (spec §6);
    /// callers choose it (e.g. under the project's asset directory).
    pub async fn assemble(
        registry_path: impl Into<PathBuf>,
        config: FleetConfig,
        backend: B,
        policy: Pol,
        probe: Pr,
        clock: C,
    ) -> Result<Arc<Self>, FleetError> {
        Self::assemble_with_command(registry_path, config, backend, policy, probe, clock, Arc::new(DefaultStudioCommand)).await
    }

    /// Same as [`Self::assemble`] but with an explicit [`StudioCommand`],
    /// letting tests substitute a fake launcher for `npx remotion studio`.
    pub async fn assemble_with_command(
        registry_path: impl Into<PathBuf>,
        config: FleetConfig,
        backend: B,
        policy: Pol,
        probe: Pr,
        clock: C,
        command: Arc<dyn StudioCommand>,
    ) -> Result<Arc<Self>, FleetError> {
        let config = Arc::new(config);
        let port = Arc::new(PortInspector::with_policy(backend, policy, config.clone()));
        let discovery = Arc::new(Discovery::new(probe));
        let lifecycle = Arc::new(LifecycleEngine::with_command(port.clone(), discovery.clone(), command));
        let registry = Arc::new(
            Registry::open(registry_path, lifecycle.clone(), discovery.clone(), port.clone(), config.clone(), clock.clone())
                .await?,
        );
        let health = Arc::new(HealthMonitor::new(registry.clone(), lifecycle.clone(), discovery.clone(), config.clone(), clock));

        info!(instances = registry.instances().await.len(), "fleet assembled");
        health.start();

        Ok(Arc::new(Self { config, port, discovery, lifecycle, registry, health }))
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Implements the directed/smart launch branching of spec §4.4.
    pub async fn launch(
        &self,
        project_path: &Path,
        project_name: Option<&str>,
        preferred_port: Option<u16>,
        force_new_port: bool,
    ) -> Result<StudioInstance, FleetError> {
        let (instance, _reused) = self.registry.smart_launch(project_path, project_name, preferred_port, force_new_port).await?;
        Ok(instance)
    }

    pub async fn stop(&self, port: u16) -> Result<bool, FleetError> {
        self.registry.stop(port).await
    }

    pub async fn restart(&self, port: u16) -> Result<StudioInstance, FleetError> {
        self.registry.restart(port).await
    }

    pub async fn status(&self) -> Vec<StudioInstance> {
        self.registry.status().await
    }

    pub async fn discover(&self, range: Option<std::ops::RangeInclusive<u16>>) -> Vec<DiscoveredStudio> {
        self.discovery.discover(range).await
    }

    pub async fn refresh_discovery(&self) -> RefreshReport {
        self.registry.refresh_discovery().await
    }

    pub async fn kill_orphans(&self) -> KillOrphansReport {
        self.registry.kill_orphans().await
    }

    /// Fleet-wide health snapshot, per spec §4.5's `report()`.
    pub fn health_report(&self) -> HealthReport {
        self.health.report()
    }

    pub fn health_status(&self, port: Option<u16>) -> Vec<HealthRecord> {
        self.health.get_status(port)
    }

    /// Clears quarantine for `port`, the only operator-initiated path back
    /// to auto-recovery eligibility, per spec §7.
    pub fn reset_health(&self, port: u16) {
        self.health.reset(port)
    }

    pub async fn trigger_recovery(&self, port: u16) {
        self.health.trigger_recovery(port).await
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        self.registry.subscribe(filter)
    }

    /// Stops the health monitor's background sweep. Does not stop any
    /// managed studio process — those persist across a controller restart
    /// by design (spec §4.4's warm-reuse path finds them again).
    pub async fn shutdown(&self) {
        self.health.stop().await;
    }

    /// Allows a caller with an explicit [`LaunchRequest`] (e.g. one that
    /// opts into HTTP validation) to bypass the registry's smart-launch
    /// heuristics and drive C3 directly, mirroring the Health Monitor's
    /// own recovery path. Rarely needed outside tests.
    pub async fn launch_direct(&self, request: LaunchRequest) -> Result<fleet_lifecycle::LaunchResult, FleetError> {
        self.lifecycle.launch(request).await
    }
}

/// Production alias: every seam bound to its real implementation.
pub type Fleet = FleetController<SystemBackend, DefaultProtectionPolicy, RealHttpProbe, SystemClock>;

impl Fleet {
    /// Convenience constructor for the production stack, per spec §6's
    /// environment-driven [`FleetConfig::from_env`].
    pub async fn start(registry_path: impl Into<PathBuf>) -> Result<Arc<Self>, FleetError> {
        Self::assemble(
            registry_path,
            FleetConfig::from_env(),
            SystemBackend,
            DefaultProtectionPolicy,
            RealHttpProbe::new(),
            SystemClock,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FakeClock;
    use fleet_discovery::FakeHttpProbe;
    use fleet_port::FakeBackend;
    use std::path::Path;

    type TestFleet = FleetController<FakeBackend, DefaultProtectionPolicy, FakeHttpProbe, FakeClock>;

    struct ShellStudioCommand;
    impl StudioCommand for ShellStudioCommand {
        fn build(&self, _project_path: &Path, _port: u16) -> (String, Vec<String>) {
            ("/bin/sh".to_string(), vec!["-c".to_string(), "echo server running; sleep 5".to_string()])
        }
    }

    async fn make_fleet(registry_dir: &Path) -> (std::sync::Arc<TestFleet>, FakeHttpProbe, FakeBackend) {
        let mut config = FleetConfig::defaults();
        config.health_interval = std::time::Duration::from_secs(3600);
        let backend = FakeBackend::new();
        let probe = FakeHttpProbe::new();
        let registry_path = registry_dir.join(".studio-registry.json");
        let fleet = TestFleet::assemble_with_command(
            registry_path,
            config,
            backend.clone(),
            DefaultProtectionPolicy,
            probe.clone(),
            FakeClock::new(),
            std::sync::Arc::new(ShellStudioCommand),
        )
        .await
        .unwrap();
        (fleet, probe, backend)
    }

    fn make_project(dir: &Path) {
        std::fs::write(dir.join("package.json"), "{}").unwrap();
    }

    #[tokio::test]
    async fn launch_then_status_reports_the_instance() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (fleet, _probe, backend) = make_fleet(assets.path()).await;

        let instance = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
        backend.set_holder(instance.port, instance.pid, "node");

        let status = fleet.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].port, instance.port);

        fleet.shutdown().await;
    }

    #[tokio::test]
    async fn stop_removes_the_instance() {
        let assets = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        make_project(project.path());
        let (fleet, _probe, backend) = make_fleet(assets.path()).await;

        let instance = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
        backend.set_holder(instance.port, instance.pid, "node");

        let killed = fleet.stop(instance.port).await.unwrap();
        assert!(killed);
        assert!(fleet.status().await.is_empty());

        fleet.shutdown().await;
    }

    #[tokio::test]
    async fn health_report_starts_empty_before_any_sweep() {
        let assets = tempfile::tempdir().unwrap();
        let (fleet, _probe, _backend) = make_fleet(assets.path()).await;
        let report = fleet.health_report();
        assert_eq!(report.healthy, 0);
        assert_eq!(report.unhealthy, 0);
        fleet.shutdown().await;
    }
}
