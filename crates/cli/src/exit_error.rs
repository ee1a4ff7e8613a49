// SPDX-License-Identifier: MIT

//! Carries a process exit code alongside the error message, so `main`
//! decides how the process terminates instead of commands calling
//! `std::process::exit` themselves.

use fleet_core::FleetError;
use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<FleetError> for ExitError {
    fn from(err: FleetError) -> Self {
        Self { code: err.kind.exit_code(), message: err.to_string() }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::FleetErrorKind;

    #[test]
    fn maps_no_free_port_to_exit_code_three() {
        let err = FleetError::no_free_port("3002-3100");
        let exit: ExitError = err.into();
        assert_eq!(exit.code, 3);
    }

    #[test]
    fn maps_unclassified_kind_to_one() {
        let err = FleetError::new(FleetErrorKind::ProcessGone, "1234", "vanished");
        let exit: ExitError = err.into();
        assert_eq!(exit.code, 1);
    }
}
