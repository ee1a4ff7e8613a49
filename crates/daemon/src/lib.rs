// SPDX-License-Identifier: MIT

//! fleet-daemon: ambient wiring for the Studio Fleet Controller — the
//! [`Fleet`] facade assembling C1-C5, plus the process-wide logging setup
//! an embedding binary installs once in `main`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod fleet;
mod tracing_init;

pub use fleet::{Fleet, FleetController};
pub use tracing_init::init_tracing;

pub use fleet_core::{FleetConfig, FleetError, FleetErrorKind};
