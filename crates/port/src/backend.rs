// SPDX-License-Identifier: MIT

//! The pluggable back-end seam for port inspection, grounded in
//! `other_examples/…enviral-win-sanity-suite…system-ports.rs` (netstat2 +
//! sysinfo for cross-platform socket-to-process resolution).

use async_trait::async_trait;
use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use sysinfo::{Pid, System};
use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("socket table query failed: {0}")]
    SocketQuery(String),
    #[error("process operation failed: {0}")]
    Process(String),
}

/// What the OS reports holding a port, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHolder {
    pub pid: u32,
    pub name: String,
}

/// Cross-platform port/process inspection capability.
///
/// All methods are non-fatal per spec §4.1: an `Err` here means "the OS
/// query itself failed", which [`crate::PortInspector`] treats as "unknown
/// holder", never as "port is free".
#[async_trait]
pub trait PortBackend: Send + Sync {
    /// Who (if anyone) the OS reports listening on `port`.
    async fn inspect(&self, port: u16) -> Result<Option<PortHolder>, BackendError>;

    /// Whether a loopback bind on `port` would succeed right now. Must
    /// bind on `127.0.0.1`, never `0.0.0.0`, per spec §4.1's note about
    /// avoiding firewall interaction.
    async fn bindable(&self, port: u16) -> Result<bool, BackendError>;

    /// Send a graceful terminate to `pid`; if `force`, escalate to a hard
    /// kill after the caller's grace window. Returns whether the process
    /// was observed to be gone afterward.
    async fn terminate(&self, pid: u32, force: bool) -> Result<bool, BackendError>;

    /// Whether `pid` is still alive.
    async fn is_alive(&self, pid: u32) -> bool;
}

/// The real, OS-backed implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
    pub fn new() -> Self {
        Self
    }
}

fn socket_holder(port: u16) -> Result<Option<PortHolder>, BackendError> {
    let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
    let proto_flags = ProtocolFlags::TCP;
    let sockets = get_sockets_info(af_flags, proto_flags)
        .map_err(|e| BackendError::SocketQuery(e.to_string()))?;

    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

    for socket in sockets {
        if let ProtocolSocketInfo::Tcp(tcp) = socket.protocol_socket_info {
            if tcp.local_port != port {
                continue;
            }
            let Some(pid) = socket.associated_pids.first().copied() else { continue };
            if pid == 0 {
                continue;
            }
            let name = sys
                .process(Pid::from_u32(pid))
                .map(|p| p.name().to_string_lossy().to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            return Ok(Some(PortHolder { pid, name }));
        }
    }
    Ok(None)
}

#[async_trait]
impl PortBackend for SystemBackend {
    async fn inspect(&self, port: u16) -> Result<Option<PortHolder>, BackendError> {
        tokio::task::spawn_blocking(move || socket_holder(port))
            .await
            .map_err(|e| BackendError::SocketQuery(e.to_string()))?
    }

    async fn bindable(&self, port: u16) -> Result<bool, BackendError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                drop(listener);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn terminate(&self, pid: u32, force: bool) -> Result<bool, BackendError> {
        tokio::task::spawn_blocking(move || terminate_blocking(pid, force))
            .await
            .map_err(|e| BackendError::Process(e.to_string()))?
    }

    async fn is_alive(&self, pid: u32) -> bool {
        tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
            sys.process(Pid::from_u32(pid)).is_some()
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<(), BackendError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid as NixPid;
    kill(NixPid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| BackendError::Process(e.to_string()))
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<(), BackendError> {
    Ok(())
}

fn terminate_blocking(pid: u32, force: bool) -> Result<bool, BackendError> {
    let mut sys = System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    if sys.process(Pid::from_u32(pid)).is_none() {
        return Ok(true);
    }

    // Graceful terminate first, regardless of `force` — §4.1 says "sends a
    // graceful terminate, waits up to 1s, and optionally escalates".
    send_sigterm(pid)?;
    std::thread::sleep(Duration::from_millis(200));

    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    let still_alive = sys.process(Pid::from_u32(pid)).is_some();
    if !still_alive {
        return Ok(true);
    }
    if !force {
        return Ok(false);
    }

    match sys.process(Pid::from_u32(pid)) {
        Some(process) => Ok(process.kill()),
        None => Ok(true),
    }
}
