// SPDX-License-Identifier: MIT

//! The health-record and recovery-queue models the Health Monitor owns
//! privately, per spec §5 ("never shared by reference outside it; callers
//! receive snapshots").

use std::time::Instant;

/// Per-port health state. `quarantined` is set once `recovery_attempts`
/// reaches `MAX_RECOVERY_ATTEMPTS` and is only cleared by an operator
/// calling [`crate::HealthMonitor::reset`].
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub port: u16,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub recovery_attempts: u32,
    pub quarantined: bool,
}

impl HealthRecord {
    pub fn new(port: u16) -> Self {
        Self { port, healthy: true, consecutive_failures: 0, last_error: None, recovery_attempts: 0, quarantined: false }
    }
}

/// An entry awaiting a due recovery attempt, per spec §4.5 step 4's
/// `next_attempt_at = now + RECOVERY_DELAY`.
#[derive(Debug, Clone)]
pub(crate) struct RecoveryQueueEntry {
    pub next_attempt_at: Instant,
}
