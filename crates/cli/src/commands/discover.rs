// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use fleet_daemon::Fleet;

pub async fn handle(fleet: &Fleet, min: Option<u16>, max: Option<u16>, format: OutputFormat) -> Result<(), ExitError> {
    let range = match (min, max) {
        (Some(lo), Some(hi)) => Some(lo..=hi),
        _ => None,
    };
    let found = fleet.discover(range).await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found).unwrap_or_default()),
        OutputFormat::Text => {
            if found.is_empty() {
                println!("no studios found");
            }
            for studio in &found {
                println!(
                    "port={} responding={} project={:?} pid_hint={:?}",
                    studio.port, studio.responding, studio.project_hint, studio.pid_hint
                );
            }
        }
    }
    Ok(())
}
