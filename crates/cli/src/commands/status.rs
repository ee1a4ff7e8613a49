// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use fleet_daemon::Fleet;

pub async fn handle(fleet: &Fleet, format: OutputFormat) -> Result<(), ExitError> {
    let instances = fleet.status().await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&instances).unwrap_or_default()),
        OutputFormat::Text => {
            if instances.is_empty() {
                println!("no tracked studio instances");
            }
            for instance in &instances {
                println!(
                    "port={} pid={} project={} status={:?} url={}",
                    instance.port, instance.pid, instance.project_name, instance.status, instance.url
                );
            }
        }
    }
    Ok(())
}
