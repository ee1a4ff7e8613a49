// SPDX-License-Identifier: MIT

//! fleet-lifecycle: C3, validated spawn of a studio with readiness
//! detection, and graceful/forced shutdown.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod command;
mod engine;
mod spawn;

pub use command::{DefaultStudioCommand, StudioCommand};
pub use engine::{LaunchResult, LifecycleEngine, ShutdownResult, ShutdownTarget, StatusReport};
pub use spawn::{LaunchOutcome, LaunchRequest, ProcessState, FAILURE_TOKENS, SUCCESS_TOKENS};

use std::time::Duration;

/// `launch`'s hard ceiling per spec §4.3 ("Absolute hard timeout is
/// `timeout` (default 60 s)").
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry budget for `launch`, per spec §4.3 step 7.
pub const MAX_STARTUP_ATTEMPTS: u32 = 3;
