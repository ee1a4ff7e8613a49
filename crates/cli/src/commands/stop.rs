// SPDX-License-Identifier: MIT

use crate::exit_error::ExitError;
use fleet_daemon::Fleet;

pub async fn handle(fleet: &Fleet, port: u16) -> Result<(), ExitError> {
    let stopped = fleet.stop(port).await?;
    if stopped {
        println!("stopped instance on port {port}");
    } else {
        println!("no instance was tracked on port {port}");
    }
    Ok(())
}
