// SPDX-License-Identifier: MIT

//! [`HealthMonitor`]: the C5 public contract — a periodic HTTP sweep over
//! every instance C4 tracks, failure counting, and bounded recovery via
//! C3, per spec §4.5.
//!
//! The periodic loop (`tokio::time::interval` with `MissedTickBehavior::
//! Skip`, cancelled via a `CancellationToken`) is grounded in
//! `other_examples/…gglib…health_monitor.rs`'s `ServerHealthMonitor::
//! monitor` — that file's free functions (`check_http`/`check_process`)
//! become `perform_check`'s per-port classification here, generalized from
//! one process to the whole tracked fleet.

use crate::record::{HealthRecord, RecoveryQueueEntry};
use fleet_core::{Clock, EventFilter, EventReceiver, EventSink, FleetConfig, FleetEvent};
use fleet_discovery::HttpProbe;
use fleet_lifecycle::{LaunchRequest, LifecycleEngine, ShutdownTarget};
use fleet_port::{PortBackend, ProtectionPolicy};
use fleet_registry::Registry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Brief pause after a shutdown to let the OS release the port before
/// relaunching on it, per spec §4.5's "waits briefly for the port to be
/// released".
const PORT_RELEASE_GRACE: Duration = Duration::from_millis(300);

/// Fleet-wide snapshot returned by [`HealthMonitor::report`].
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub quarantined: usize,
    pub pending_recovery: usize,
}

struct MonitorState {
    records: HashMap<u16, HealthRecord>,
    recovery_queue: HashMap<u16, RecoveryQueueEntry>,
}

/// Owns the health-record map and recovery queue privately (spec §5:
/// "never shared by reference outside it; callers receive snapshots").
/// Generic over the same four backend seams as [`Registry`] so the whole
/// stack can be driven by fakes in tests.
pub struct HealthMonitor<B: PortBackend, Pol: ProtectionPolicy, Pr: HttpProbe, C: Clock> {
    registry: Arc<Registry<B, Pol, Pr, C>>,
    lifecycle: Arc<LifecycleEngine<B, Pol, Pr>>,
    discovery: Arc<fleet_discovery::Discovery<Pr>>,
    config: Arc<FleetConfig>,
    clock: C,
    state: Mutex<MonitorState>,
    events: EventSink,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<B, Pol, Pr, C> HealthMonitor<B, Pol, Pr, C>
where
    B: PortBackend + 'static,
    Pol: ProtectionPolicy + 'static,
    Pr: HttpProbe + 'static,
    C: Clock,
{
    pub fn new(
        registry: Arc<Registry<B, Pol, Pr, C>>,
        lifecycle: Arc<LifecycleEngine<B, Pol, Pr>>,
        discovery: Arc<fleet_discovery::Discovery<Pr>>,
        config: Arc<FleetConfig>,
        clock: C,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            discovery,
            config,
            clock,
            state: Mutex::new(MonitorState { records: HashMap::new(), recovery_queue: HashMap::new() }),
            events: EventSink::new(),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventReceiver {
        self.events.subscribe(filter)
    }

    /// Spawns the periodic sweep task. A no-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move { monitor.run_loop().await }));
    }

    /// Cancels the sweep task and waits for the in-flight sweep (bounded
    /// by `HTTP_TIMEOUT` per port) to finish. A no-op if not running.
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        let Some(handle) = handle else { return };
        self.cancel.cancel();
        let _ = handle.await;
    }

    async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.health_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.perform_check().await,
                _ = self.cancel.cancelled() => break,
            }
        }
    }

    /// Runs one sweep: probe, classify, enqueue/process recovery. Callable
    /// directly by tests without the background loop.
    pub async fn perform_check(&self) {
        let instances = self.registry.instances().await;
        let tracked_ports: Vec<u16> = instances.iter().map(|i| i.port).collect();
        self.drop_untracked(&tracked_ports);

        for instance in &instances {
            let outcome = self.discovery.head(instance.port, self.config.http_timeout).await;
            let healthy_now = matches!(outcome, Ok(status) if (200..500).contains(&status));
            let error = outcome.err().map(|e| e.to_string());

            let transition = {
                let mut state = self.state.lock();
                let record = state.records.entry(instance.port).or_insert_with(|| HealthRecord::new(instance.port));
                classify(record, healthy_now, error, self.config.failure_threshold)
            };

            match transition {
                Transition::BecameUnhealthy { consecutive_failures, last_error } => {
                    self.events.publish(FleetEvent::StudioUnhealthy {
                        port: instance.port,
                        consecutive_failures,
                        last_error,
                    });
                    let quarantined = self.state.lock().records.get(&instance.port).is_some_and(|r| r.quarantined);
                    if self.config.auto_recover && !quarantined {
                        self.state.lock().recovery_queue.insert(
                            instance.port,
                            RecoveryQueueEntry { next_attempt_at: self.clock.now() + self.config.recovery_delay },
                        );
                    }
                }
                Transition::BecameHealthy => {
                    self.state.lock().recovery_queue.remove(&instance.port);
                    self.events.publish(FleetEvent::StudioRecovered {
                        port: instance.port,
                        new_pid: instance.pid,
                        attempts: 0,
                    });
                }
                Transition::Unchanged => {}
            }
        }

        self.process_due_recoveries().await;

        let report = self.report();
        self.events.publish(FleetEvent::HealthCheck {
            healthy: report.healthy,
            unhealthy: report.unhealthy,
            recovered: 0,
        });
    }

    async fn process_due_recoveries(&self) {
        let now = self.clock.now();
        let due: Vec<u16> = {
            let state = self.state.lock();
            state.recovery_queue.iter().filter(|(_, e)| e.next_attempt_at <= now).map(|(p, _)| *p).collect()
        };
        for port in due {
            self.state.lock().recovery_queue.remove(&port);
            self.attempt_recovery(port).await;
        }
    }

    /// Implements spec §4.5's `attempt_recovery(port)`.
    pub async fn attempt_recovery(&self, port: u16) {
        let already_maxed = {
            let state = self.state.lock();
            state.records.get(&port).is_some_and(|r| r.recovery_attempts >= self.config.max_recovery_attempts)
        };
        if already_maxed {
            return;
        }

        let Some(instance) = self.registry.instance(port).await else {
            self.state.lock().recovery_queue.remove(&port);
            return;
        };

        let shutdown = self.lifecycle.shutdown(ShutdownTarget::Port(port), false).await;
        if shutdown.killed.is_empty() {
            let _ = self.lifecycle.shutdown(ShutdownTarget::Port(port), true).await;
        }
        tokio::time::sleep(PORT_RELEASE_GRACE).await;

        if instance.project_path.is_empty() {
            self.record_recovery_failure(port, "no project_path on record, cannot relaunch").await;
            return;
        }

        let request = LaunchRequest::new(instance.project_path.as_str()).preferred_port(port).validate(true);
        match self.lifecycle.launch(request).await {
            Ok(result) => {
                self.registry.reconcile_after_recovery(port, result.pid).await;
                let attempts = {
                    let mut state = self.state.lock();
                    let record = state.records.entry(port).or_insert_with(|| HealthRecord::new(port));
                    record.consecutive_failures = 0;
                    record.healthy = true;
                    record.recovery_attempts
                };
                self.events.publish(FleetEvent::StudioRecovered { port, new_pid: result.pid, attempts });
            }
            Err(e) => self.record_recovery_failure(port, &e.to_string()).await,
        }
    }

    async fn record_recovery_failure(&self, port: u16, error: &str) {
        let (attempts, quarantined) = {
            let mut state = self.state.lock();
            let record = state.records.entry(port).or_insert_with(|| HealthRecord::new(port));
            record.recovery_attempts += 1;
            record.last_error = Some(error.to_string());
            if record.recovery_attempts >= self.config.max_recovery_attempts {
                record.quarantined = true;
            }
            (record.recovery_attempts, record.quarantined)
        };
        self.events.publish(FleetEvent::RecoveryFailed { port, attempts, error: error.to_string() });
        if quarantined {
            warn!(port, attempts, "recovery exhausted, quarantining port");
            self.state.lock().recovery_queue.remove(&port);
        } else {
            self.state
                .lock()
                .recovery_queue
                .insert(port, RecoveryQueueEntry { next_attempt_at: self.clock.now() + self.config.recovery_delay });
        }
    }

    /// Manually triggers recovery regardless of the queue's due time.
    /// Still refuses a quarantined port.
    pub async fn trigger_recovery(&self, port: u16) {
        self.state.lock().recovery_queue.remove(&port);
        self.attempt_recovery(port).await;
    }

    /// Clears quarantine and failure history for `port`, per spec §7's
    /// "operator may reset" — the only way a quarantined port becomes
    /// eligible for auto-recovery again.
    pub fn reset(&self, port: u16) {
        let mut state = self.state.lock();
        state.recovery_queue.remove(&port);
        if let Some(record) = state.records.get_mut(&port) {
            record.quarantined = false;
            record.recovery_attempts = 0;
            record.consecutive_failures = 0;
        }
    }

    /// A single port's record, or every record when `port` is `None`.
    pub fn get_status(&self, port: Option<u16>) -> Vec<HealthRecord> {
        let state = self.state.lock();
        match port {
            Some(p) => state.records.get(&p).cloned().into_iter().collect(),
            None => state.records.values().cloned().collect(),
        }
    }

    pub fn report(&self) -> HealthReport {
        let state = self.state.lock();
        let mut report = HealthReport::default();
        for record in state.records.values() {
            if record.quarantined {
                report.quarantined += 1;
            } else if record.healthy {
                report.healthy += 1;
            } else {
                report.unhealthy += 1;
            }
        }
        report.pending_recovery = state.recovery_queue.len();
        report
    }

    fn drop_untracked(&self, tracked_ports: &[u16]) {
        let mut state = self.state.lock();
        state.records.retain(|port, _| tracked_ports.contains(port));
        state.recovery_queue.retain(|port, _| tracked_ports.contains(port));
    }
}

enum Transition {
    BecameUnhealthy { consecutive_failures: u32, last_error: Option<String> },
    BecameHealthy,
    Unchanged,
}

/// Pure classification step, separated out so its edge logic (spec §4.5
/// steps 3-5) is unit-testable without an HTTP round trip.
fn classify(record: &mut HealthRecord, healthy_now: bool, error: Option<String>, failure_threshold: u32) -> Transition {
    if healthy_now {
        let was_unhealthy = !record.healthy;
        record.consecutive_failures = 0;
        record.last_error = None;
        record.healthy = true;
        if was_unhealthy {
            Transition::BecameHealthy
        } else {
            Transition::Unchanged
        }
    } else {
        record.consecutive_failures += 1;
        record.last_error = error.clone();
        if record.healthy && record.consecutive_failures >= failure_threshold {
            record.healthy = false;
            Transition::BecameUnhealthy { consecutive_failures: record.consecutive_failures, last_error: error }
        } else {
            Transition::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HealthRecord;

    fn threshold_record() -> HealthRecord {
        HealthRecord::new(3002)
    }

    #[test]
    fn classify_stays_healthy_below_threshold() {
        let mut record = threshold_record();
        let t = classify(&mut record, false, Some("timeout".to_string()), 3);
        assert!(matches!(t, Transition::Unchanged));
        assert!(record.healthy);
        assert_eq!(record.consecutive_failures, 1);
    }

    #[test]
    fn classify_crosses_threshold_into_unhealthy() {
        let mut record = threshold_record();
        for _ in 0..2 {
            classify(&mut record, false, Some("timeout".to_string()), 3);
        }
        let t = classify(&mut record, false, Some("timeout".to_string()), 3);
        assert!(matches!(t, Transition::BecameUnhealthy { consecutive_failures: 3, .. }));
        assert!(!record.healthy);
    }

    #[test]
    fn classify_does_not_refire_once_already_unhealthy() {
        let mut record = threshold_record();
        for _ in 0..4 {
            classify(&mut record, false, Some("timeout".to_string()), 3);
        }
        assert!(!record.healthy);
        assert_eq!(record.consecutive_failures, 4);
    }

    #[test]
    fn classify_reports_recovery_on_transition_back() {
        let mut record = threshold_record();
        record.healthy = false;
        record.consecutive_failures = 5;
        let t = classify(&mut record, true, None, 3);
        assert!(matches!(t, Transition::BecameHealthy));
        assert_eq!(record.consecutive_failures, 0);
    }
}
