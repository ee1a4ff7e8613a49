// SPDX-License-Identifier: MIT

//! Pluggable classification of "this process must never be killed by us".
//!
//! Spec §9's open question: the source's `kill_process` refuses a fixed,
//! Windows-centric image-name list. This crate makes that list a trait
//! instead of a constant so a platform/deployment can swap it in.

/// Decides whether a process is a protected system service, given its
/// reported name. Also decides the "node-like" informational tag.
pub trait ProtectionPolicy: Send + Sync {
    /// True if `process_name` must never be targeted by [`crate::PortInspector::kill`].
    ///
    /// Per spec §4.1: classification is conservative — ambiguity (e.g. an
    /// empty or unrecognized name from a failed lookup) classifies as
    /// protected, never as safe-to-kill.
    fn is_system_service(&self, process_name: Option<&str>) -> bool;

    /// True if `process_name` looks like a Node.js-family process.
    /// Informational only per spec §4.1 — never used to block a kill.
    fn is_node_like(&self, process_name: Option<&str>) -> bool;
}

/// Conservative default: a small deny-list of OS-critical process names
/// (covering the Windows services the source's hardcoded list targeted,
/// plus their Unix/macOS counterparts) and "unknown ⇒ protected".
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProtectionPolicy;

const PROTECTED_NAMES: &[&str] = &[
    "svchost.exe",
    "services.exe",
    "wininit.exe",
    "csrss.exe",
    "lsass.exe",
    "system",
    "systemd",
    "launchd",
    "kernel_task",
];

const NODE_NAMES: &[&str] = &["node", "node.exe", "bun", "bun.exe", "deno", "deno.exe"];

impl ProtectionPolicy for DefaultProtectionPolicy {
    fn is_system_service(&self, process_name: Option<&str>) -> bool {
        match process_name {
            None => true,
            Some(name) => {
                let lower = name.to_ascii_lowercase();
                PROTECTED_NAMES.iter().any(|p| lower == *p)
            }
        }
    }

    fn is_node_like(&self, process_name: Option<&str>) -> bool {
        match process_name {
            None => false,
            Some(name) => {
                let lower = name.to_ascii_lowercase();
                NODE_NAMES.iter().any(|n| lower == *n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_holder_is_protected() {
        assert!(DefaultProtectionPolicy.is_system_service(None));
    }

    #[test]
    fn known_service_name_is_protected() {
        assert!(DefaultProtectionPolicy.is_system_service(Some("svchost.exe")));
        assert!(DefaultProtectionPolicy.is_system_service(Some("SYSTEMD")));
    }

    #[test]
    fn ordinary_process_is_not_protected() {
        assert!(!DefaultProtectionPolicy.is_system_service(Some("node")));
    }

    #[test]
    fn node_classification_is_informational_only() {
        assert!(DefaultProtectionPolicy.is_node_like(Some("node")));
        assert!(!DefaultProtectionPolicy.is_node_like(Some("svchost.exe")));
    }
}
