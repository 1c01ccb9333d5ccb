//! Command-level errors and their exit codes.

use std::time::Duration;

use pm_common::ConfigError;
use pm_telemetry::SinkError;
use thiserror::Error;

use crate::exit_codes::ExitCode;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("'{command}' needs a {expected} sink, configured sink is '{actual}'")]
    WrongSink {
        command: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::ConfigError,
            CliError::Sink(SinkError::Timeout { .. }) => ExitCode::TimeoutError,
            CliError::Sink(_) => ExitCode::SinkError,
            CliError::Io(_) => ExitCode::IoError,
            CliError::Output(_) => ExitCode::InternalError,
            CliError::WrongSink { .. } => ExitCode::ArgsError,
            CliError::Timeout { .. } => ExitCode::TimeoutError,
        }
    }
}
