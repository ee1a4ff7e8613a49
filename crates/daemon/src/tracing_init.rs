// SPDX-License-Identifier: MIT

//! Process-wide logging setup, grounded in the teacher's
//! `tracing-appender`/`tracing-subscriber` daemon startup, minus file
//! rotation: this crate is embedded in a host process rather than run as
//! a standalone daemon, so its only sanctioned caller is the `fleetctl`
//! binary's `main`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading `RUST_LOG` (defaulting
/// to `info`). Idempotent: a second call is a harmless no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
