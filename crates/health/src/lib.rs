// SPDX-License-Identifier: MIT

//! fleet-health: C5, the periodic HTTP sweep over every instance C4
//! tracks — failure counting, the bounded recovery queue, and the
//! quarantine rule, per spec §4.5.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod monitor;
mod record;

pub use monitor::{HealthMonitor, HealthReport};
pub use record::HealthRecord;
