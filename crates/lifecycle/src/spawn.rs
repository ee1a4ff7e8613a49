// SPDX-License-Identifier: MIT

//! Process spawn and readiness detection, shaped after the teacher's
//! `adapters::agent::coop::spawn::execute`: pipe stdout/stderr, spawn a
//! background reaper to avoid zombies, and poll for a readiness signal
//! before returning control to the caller.

use crate::command::StudioCommand;
use fleet_core::{FleetError, FleetErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

/// Lowercase substrings that mark a stdout/stderr line as a readiness
/// signal, per spec §4.3 step 5.
pub const SUCCESS_TOKENS: &[&str] = &["ready", "server running"];

/// Lowercase substrings that mark a stdout/stderr line as a startup
/// failure, per spec §4.3 step 5.
pub const FAILURE_TOKENS: &[&str] = &["error", "fatal", "cannot", "failed"];

/// `spawning → (ready | assumed_ready) → running → (stopping → stopped) |
/// error`, per spec §4.3's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Spawning,
    Ready,
    AssumedReady,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Parameters to [`crate::LifecycleEngine::launch`], per spec §4.3.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub project_path: PathBuf,
    pub preferred_port: Option<u16>,
    pub force_new: bool,
    pub timeout: Duration,
    pub validate: bool,
}

impl LaunchRequest {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            preferred_port: None,
            force_new: false,
            timeout: crate::DEFAULT_LAUNCH_TIMEOUT,
            validate: false,
        }
    }

    pub fn preferred_port(mut self, port: u16) -> Self {
        self.preferred_port = Some(port);
        self
    }

    pub fn force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// Successful outcome of a single spawn attempt.
#[derive(Debug)]
pub struct LaunchOutcome {
    pub pid: u32,
    pub state: ProcessState,
}

/// Spawns the studio, watches stdout/stderr for a readiness or failure
/// token, and falls back to "assumed ready" once `min(timeout/2, 10s)`
/// elapses with the process still alive, per spec §4.3 step 5.
pub(crate) async fn spawn_and_watch(
    command: &dyn StudioCommand,
    project_path: &Path,
    port: u16,
    timeout: Duration,
) -> Result<LaunchOutcome, FleetError> {
    let (program, args) = command.build(project_path, port);
    let mut cmd = Command::new(&program);
    cmd.args(&args)
        .current_dir(project_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    // Command inherits the parent's environment (including PATH) by
    // default, satisfying "environment inherits the parent's" from §4.3.

    let mut child = cmd.spawn().map_err(|e| {
        FleetError::new(FleetErrorKind::SpawnFailure, project_path.display().to_string(), e.to_string())
    })?;
    let pid = child.id().ok_or_else(|| {
        FleetError::new(
            FleetErrorKind::SpawnFailure,
            project_path.display().to_string(),
            "process exited before a pid could be read",
        )
    })?;

    let (tx, mut rx) = mpsc::channel::<String>(64);
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, tx.clone());
    }
    drop(tx);

    let half_timeout = timeout.checked_div(2).unwrap_or(timeout).min(Duration::from_secs(10));
    let deadline = Instant::now() + timeout;
    let half_deadline = Instant::now() + half_timeout;

    let state = loop {
        if Instant::now() >= deadline {
            let _ = child.start_kill();
            return Err(FleetError::new(
                FleetErrorKind::ReadinessTimeout,
                pid.to_string(),
                format!("studio did not become ready within {timeout:?}"),
            ));
        }
        let wake_at = half_deadline.min(deadline);

        tokio::select! {
            line = rx.recv() => {
                match line {
                    Some(line) => {
                        let lower = line.to_lowercase();
                        if FAILURE_TOKENS.iter().any(|t| lower.contains(t)) {
                            let _ = child.start_kill();
                            return Err(FleetError::new(
                                FleetErrorKind::SpawnFailure,
                                pid.to_string(),
                                format!("studio reported failure: {line}"),
                            ));
                        }
                        if SUCCESS_TOKENS.iter().any(|t| lower.contains(t)) {
                            break ProcessState::Ready;
                        }
                    }
                    None => {
                        // Both streams closed without a token. If the
                        // process already exited, that's a spawn failure;
                        // otherwise keep waiting out the assumed-ready
                        // clock.
                        if let Ok(Some(status)) = child.try_wait() {
                            return Err(FleetError::new(
                                FleetErrorKind::SpawnFailure,
                                pid.to_string(),
                                format!("process exited before becoming ready: {status}"),
                            ));
                        }
                        tokio::time::sleep_until(wake_at).await;
                    }
                }
            }
            _ = tokio::time::sleep_until(wake_at) => {
                if Instant::now() >= half_deadline {
                    match child.try_wait() {
                        Ok(None) => break ProcessState::AssumedReady,
                        Ok(Some(status)) => {
                            return Err(FleetError::new(
                                FleetErrorKind::SpawnFailure,
                                pid.to_string(),
                                format!("process exited before becoming ready: {status}"),
                            ));
                        }
                        Err(e) => {
                            return Err(FleetError::new(FleetErrorKind::SpawnFailure, pid.to_string(), e.to_string()));
                        }
                    }
                }
            }
        }
    };

    tokio::spawn(reap(child, pid));
    Ok(LaunchOutcome { pid, state })
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Waits out the rest of the child's life to avoid a zombie process,
/// copied in shape from the teacher's spawn reaper task.
async fn reap(child: Child, pid: u32) {
    let mut child = child;
    match child.wait().await {
        Ok(status) => {
            tracing::info!(pid, exit_status = %status, "studio process exited");
        }
        Err(e) => {
            warn!(pid, error = %e, "failed to wait on studio process");
        }
    }
}
