//! Command-line argument types shared by the binary and its tests.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pm_common::SinkConfig;

use crate::logging::{LogFormat, LogLevel};

/// Portal metrics service: batches network observations into bulk writes.
#[derive(Parser, Debug)]
#[command(name = "pm-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Minimum log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format on stderr (human, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read JSON-lines metric records from stdin and batch them into the sink
    Run(RunArgs),

    /// Validate configuration and print the resolved result
    CheckConfig(ConfigArgs),

    /// Create the metrics table in Postgres
    InitDb(ConfigArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file (default: $PM_CONFIG, then ~/.config/portal-metrics/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured sink kind
    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Seconds to wait for queued records to reach the worker after input ends
    #[arg(long, default_value_t = 5)]
    pub drain_timeout_secs: u64,
}

/// Sink selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Postgres,
    Parquet,
    Memory,
}

impl SinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkKind::Postgres => "postgres",
            SinkKind::Parquet => "parquet",
            SinkKind::Memory => "memory",
        }
    }

    /// Default settings for this kind; Postgres picks its URL up from the environment.
    pub fn default_config(self) -> SinkConfig {
        match self {
            SinkKind::Postgres => SinkConfig::postgres(""),
            SinkKind::Parquet => SinkConfig::parquet(None),
            SinkKind::Memory => SinkConfig::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "pm-core",
            "--log-level",
            "debug",
            "run",
            "--sink",
            "memory",
            "--config",
            "/etc/pm.toml",
        ])
        .unwrap();
        assert_eq!(cli.global.log_level, Some(LogLevel::Debug));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config.sink, Some(SinkKind::Memory));
        assert_eq!(args.config.config, Some(PathBuf::from("/etc/pm.toml")));
        assert_eq!(args.drain_timeout_secs, 5);
    }

    #[test]
    fn test_log_format_after_subcommand() {
        let cli = Cli::try_parse_from(["pm-core", "check-config", "--log-format", "json"]).unwrap();
        assert_eq!(cli.global.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Commands::CheckConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_sink() {
        assert!(Cli::try_parse_from(["pm-core", "run", "--sink", "kafka"]).is_err());
    }

    #[test]
    fn test_sink_kind_defaults() {
        assert_eq!(SinkKind::Memory.default_config(), SinkConfig::Memory);
        assert_eq!(SinkKind::Parquet.default_config().kind(), "parquet");
        assert_eq!(SinkKind::Postgres.as_str(), "postgres");
    }
}
