// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use fleet_daemon::Fleet;

pub fn handle(fleet: &Fleet, port: Option<u16>, format: OutputFormat) -> Result<(), ExitError> {
    let report = fleet.health_report();
    let records = fleet.health_status(port);
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "healthy": report.healthy,
                "unhealthy": report.unhealthy,
                "quarantined": report.quarantined,
                "pending_recovery": report.pending_recovery,
                "records": records.iter().map(|r| serde_json::json!({
                    "port": r.port,
                    "healthy": r.healthy,
                    "consecutive_failures": r.consecutive_failures,
                    "recovery_attempts": r.recovery_attempts,
                    "quarantined": r.quarantined,
                    "last_error": r.last_error,
                })).collect::<Vec<_>>(),
            }))
            .unwrap_or_default()
        ),
        OutputFormat::Text => {
            println!(
                "healthy={} unhealthy={} quarantined={} pending_recovery={}",
                report.healthy, report.unhealthy, report.quarantined, report.pending_recovery
            );
            for record in &records {
                println!(
                    "port={} healthy={} failures={} recovery_attempts={} quarantined={}",
                    record.port, record.healthy, record.consecutive_failures, record.recovery_attempts, record.quarantined
                );
            }
        }
    }
    Ok(())
}
