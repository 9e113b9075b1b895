//! Plumbing commands behind the `bitcore` binary
//!
//! Each command is a thin adapter from parsed arguments onto library calls,
//! writing git-compatible output to the given writer. Commands that can fail
//! without an error (nothing found, conflicts) report it through
//! [`CommandStatus`].

pub mod plumbing;

use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Exit with status 1 and no error message
    Failure,
}

impl CommandStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            CommandStatus::Success
        } else {
            CommandStatus::Failure
        }
    }
}

impl From<CommandStatus> for ExitCode {
    fn from(status: CommandStatus) -> Self {
        match status {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::Failure => ExitCode::from(1),
        }
    }
}
