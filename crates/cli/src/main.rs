// SPDX-License-Identifier: MIT

//! `fleetctl`: a thin CLI wrapper around [`fleet_daemon::Fleet`], the one
//! sanctioned external surface for the component bundle (spec §6's exit
//! code table).

mod commands;
mod exit_error;
mod output;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetctl", about = "Studio Fleet Controller CLI")]
struct Cli {
    /// Path to the registry file. Defaults to `.studio-registry.json` in
    /// the current directory.
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch or reuse a studio for a project.
    Launch {
        project_path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        force_new_port: bool,
    },
    /// Stop the tracked instance on a port.
    Stop { port: u16 },
    /// List every tracked instance.
    Status,
    /// Scan the port range for studios not necessarily tracked here.
    Discover {
        #[arg(long)]
        min: Option<u16>,
        #[arg(long)]
        max: Option<u16>,
    },
    /// Print the health-monitor snapshot, optionally for one port.
    Health { port: Option<u16> },
    /// Clear quarantine and failure history for a port.
    Reset { port: u16 },
}

fn default_registry_path() -> PathBuf {
    std::env::current_dir().unwrap_or_default().join(".studio-registry.json")
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let registry_path = cli.registry.clone().unwrap_or_else(default_registry_path);
    let fleet = fleet_daemon::Fleet::start(registry_path).await.map_err(ExitError::from)?;

    let result: Result<(), ExitError> = match cli.command {
        Command::Launch { project_path, name, port, force_new_port } => {
            commands::launch::handle(&fleet, &project_path, name.as_deref(), port, force_new_port, cli.format).await
        }
        Command::Stop { port } => commands::stop::handle(&fleet, port).await,
        Command::Status => commands::status::handle(&fleet, cli.format).await,
        Command::Discover { min, max } => commands::discover::handle(&fleet, min, max, cli.format).await,
        Command::Health { port } => commands::health::handle(&fleet, port, cli.format),
        Command::Reset { port } => commands::reset::handle(&fleet, port),
    };

    fleet.shutdown().await;
    result.map_err(anyhow::Error::from)
}

/// The exit code table in spec §6 only covers `FleetError`-shaped
/// failures; anything else (bad CLI args, panics caught upstream by
/// `clap`) exits 1.
#[tokio::main]
async fn main() {
    fleet_daemon::init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        let code = err.downcast_ref::<ExitError>().map(|e| e.code).unwrap_or(1);
        std::process::exit(code);
    }
}
