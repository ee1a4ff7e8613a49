// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use fleet_daemon::Fleet;

pub fn handle(fleet: &Fleet, port: u16) -> Result<(), ExitError> {
    fleet.reset_health(port);
    println!("cleared quarantine and failure history for port {port}");
    Ok(())
}
