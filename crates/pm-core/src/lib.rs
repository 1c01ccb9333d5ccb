//! Portal metrics service runtime.
//!
//! Wires configuration, logging, and the batching pipeline into the
//! `pm-core` command-line tool:
//! - `run`: stdin JSON lines → batcher → sink
//! - `check-config`: resolve and validate configuration
//! - `init-db`: create the Postgres metrics table

pub mod cli;
pub mod commands;
pub mod error;
pub mod exit_codes;
pub mod ingest;
pub mod logging;

pub use error::CliError;
pub use exit_codes::ExitCode;
