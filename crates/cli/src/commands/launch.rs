// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use fleet_daemon::Fleet;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub async fn handle(
    fleet: &Fleet,
    project_path: &Path,
    name: Option<&str>,
    port: Option<u16>,
    force_new_port: bool,
    format: OutputFormat,
) -> Result<(), ExitError> {
    let instance = fleet.launch(project_path, name, port, force_new_port).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&instance).unwrap_or_default()),
        OutputFormat::Text => println!("launched {} on port {} (pid {})", instance.project_name, instance.port, instance.pid),
    }
    Ok(())
}
