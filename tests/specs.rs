// SPDX-License-Identifier: MIT

//! End-to-end scenarios driving the whole assembled [`fleet_daemon::Fleet`]
//! facade through scripted backends, one test per literal scenario this
//! controller is meant to handle: cold launch, warm reuse, a forced new
//! port, crash recovery, quarantine after exhausted recovery, and refusing
//! to touch a port a system service holds.

use fleet_core::FleetConfig;
use fleet_daemon::FleetController;
use fleet_discovery::FakeHttpProbe;
use fleet_lifecycle::StudioCommand;
use fleet_port::{DefaultProtectionPolicy, FakeBackend};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

type TestFleet = FleetController<FakeBackend, DefaultProtectionPolicy, FakeHttpProbe, fleet_core::FakeClock>;

/// Spawns a real, short-lived shell process instead of `npx remotion
/// studio`, so launches exercise the real spawn/readiness pipeline without
/// a Remotion project on disk.
struct ShellStudioCommand;

impl StudioCommand for ShellStudioCommand {
    fn build(&self, _project_path: &Path, _port: u16) -> (String, Vec<String>) {
        ("/bin/sh".to_string(), vec!["-c".to_string(), "echo server running; sleep 5".to_string()])
    }
}

async fn make_fleet(
    registry_dir: &Path,
    configure: impl FnOnce(&mut FleetConfig),
) -> (Arc<TestFleet>, FakeHttpProbe, FakeBackend, fleet_core::FakeClock) {
    let mut config = FleetConfig::defaults();
    config.health_interval = Duration::from_secs(3600);
    configure(&mut config);

    let backend = FakeBackend::new();
    let probe = FakeHttpProbe::new();
    let clock = fleet_core::FakeClock::new();
    let registry_path = registry_dir.join(".studio-registry.json");
    let fleet = TestFleet::assemble_with_command(
        registry_path,
        config,
        backend.clone(),
        DefaultProtectionPolicy,
        probe.clone(),
        clock.clone(),
        Arc::new(ShellStudioCommand),
    )
    .await
    .unwrap();
    (fleet, probe, backend, clock)
}

fn make_project(dir: &Path) {
    std::fs::write(dir.join("package.json"), "{}").unwrap();
}

#[tokio::test]
async fn cold_launch_assigns_a_managed_port_and_persists_it() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, _probe, backend, _clock) = make_fleet(assets.path(), |_| {}).await;

    let instance = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
    backend.set_holder(instance.port, instance.pid, "node");

    assert!((3002..=3100).contains(&instance.port));
    assert_eq!(instance.status, fleet_core::StudioStatus::Running);

    let status = fleet.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].port, instance.port);

    let raw = std::fs::read_to_string(assets.path().join(".studio-registry.json")).unwrap();
    assert!(raw.contains(&instance.port.to_string()));

    fleet.shutdown().await;
}

#[tokio::test]
async fn warm_reuse_returns_the_same_instance_without_a_second_spawn() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, probe, backend, _clock) = make_fleet(assets.path(), |_| {}).await;

    let first = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
    backend.set_holder(first.port, first.pid, "node");
    // The running studio now answers discovery probes, the signal the
    // registry's reuse path keys off of.
    probe.set_response(first.port, 200, "<title>alpha</title><body data-remotion-root>x</body>");

    let second = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();

    assert_eq!(second.port, first.port);
    assert_eq!(second.pid, first.pid);
    assert_eq!(fleet.status().await.len(), 1);

    fleet.shutdown().await;
}

#[tokio::test]
async fn forced_new_port_stops_the_old_instance_and_relaunches_on_the_requested_port() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, _probe, backend, _clock) = make_fleet(assets.path(), |_| {}).await;

    let first = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
    backend.set_holder(first.port, first.pid, "node");

    let second = fleet.launch(project.path(), Some("alpha"), Some(3010), true).await.unwrap();
    backend.set_holder(second.port, second.pid, "node");

    assert_eq!(second.port, 3010);
    assert_ne!(second.pid, first.pid);

    let status = fleet.status().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].port, 3010);

    fleet.shutdown().await;
}

#[tokio::test]
async fn crashed_instance_is_detected_unhealthy_then_recovered_with_a_new_pid() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, probe, backend, _clock) = make_fleet(assets.path(), |cfg| {
        cfg.health_interval = Duration::from_millis(20);
        cfg.failure_threshold = 1;
        cfg.http_timeout = Duration::from_millis(50);
    })
    .await;

    let instance = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
    backend.set_holder(instance.port, instance.pid, "node");

    // No probe response configured: the child has gone silent, the stand-in
    // for "the process crashed". The running sweep (health_interval=20ms)
    // picks this up within a couple of ticks.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let unhealthy = fleet.health_status(Some(instance.port));
    assert_eq!(unhealthy.len(), 1);
    assert!(!unhealthy[0].healthy);
    assert_eq!(fleet.health_report().pending_recovery, 1);

    // The relaunched process now answers, the way a freshly started studio
    // would once it is ready. Recovery is driven directly rather than
    // waiting out the queue's delay, which the sweep's frozen fake clock
    // never reaches on its own.
    probe.set_response(instance.port, 200, "ok");
    fleet.trigger_recovery(instance.port).await;

    let status = fleet.status().await;
    assert_eq!(status.len(), 1);
    assert_ne!(status[0].pid, instance.pid);
    let recovered = fleet.health_status(Some(instance.port));
    assert!(recovered[0].healthy);
    // A successful recovery resets the failure streak but doesn't count
    // against the attempt ceiling the way a failed one does.
    assert_eq!(recovered[0].recovery_attempts, 0);

    fleet.shutdown().await;
}

#[tokio::test]
async fn exhausted_recovery_quarantines_the_port_until_an_explicit_reset() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, _probe, backend, _clock) = make_fleet(assets.path(), |cfg| {
        cfg.max_recovery_attempts = 2;
    })
    .await;

    let instance = fleet.launch(project.path(), Some("alpha"), None, false).await.unwrap();
    backend.set_holder(instance.port, instance.pid, "node");

    // Make every relaunch attempt fail validation: no manifest, no project.
    std::fs::remove_file(project.path().join("package.json")).unwrap();

    fleet.trigger_recovery(instance.port).await;
    fleet.trigger_recovery(instance.port).await;
    let status = fleet.health_status(Some(instance.port));
    assert_eq!(status[0].recovery_attempts, 2);
    assert!(status[0].quarantined);
    assert_eq!(fleet.health_report().quarantined, 1);

    // A further attempt is refused outright; the attempt count does not
    // climb past the configured ceiling.
    fleet.trigger_recovery(instance.port).await;
    let status = fleet.health_status(Some(instance.port));
    assert_eq!(status[0].recovery_attempts, 2);

    fleet.reset_health(instance.port);
    assert_eq!(fleet.health_report().quarantined, 0);

    fleet.shutdown().await;
}

#[tokio::test]
async fn launch_on_a_port_held_by_a_system_service_is_refused() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, _probe, backend, _clock) = make_fleet(assets.path(), |_| {}).await;

    backend.set_holder(3015, 4, "svchost.exe");

    let err = fleet.launch(project.path(), Some("alpha"), Some(3015), false).await.unwrap_err();
    assert_eq!(err.kind, fleet_core::FleetErrorKind::UnsafePort);
    assert!(fleet.status().await.is_empty());

    fleet.shutdown().await;
}

#[tokio::test]
async fn launch_on_a_reserved_port_is_refused_with_no_spawn() {
    let assets = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    make_project(project.path());
    let (fleet, _probe, _backend, _clock) = make_fleet(assets.path(), |cfg| {
        cfg.reserved_ports.insert(3015);
    })
    .await;

    let err = fleet.launch(project.path(), Some("alpha"), Some(3015), false).await.unwrap_err();
    assert_eq!(err.kind, fleet_core::FleetErrorKind::UnsafePort);
    assert!(fleet.status().await.is_empty());

    fleet.shutdown().await;
}
