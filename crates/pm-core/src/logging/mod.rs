//! Structured logging for the metrics service.
//!
//! - Human-readable console output for interactive use
//! - JSON lines for log shippers
//!
//! stdout is reserved for command payloads; all log output goes to stderr.
//! Pipeline events carry a stable `event` field (see `pm_telemetry::events`).

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: LogLevel) -> String {
    format!("pm_core={level},pm_telemetry={level},pm_common={level},sqlx=warn")
}

/// Pick the filter for `config`.
///
/// `RUST_LOG` directives apply only when neither `--log-level` nor `PM_LOG`
/// chose a level; invalid directives fall back to the level defaults.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    config
        .env_directives
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directives(config.level)))
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup before any logging occurs. A second call
/// is ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .flatten_event(true),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("pm-core: logging already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        let directives = default_directives(LogLevel::Debug);
        assert!(directives.contains("pm_core=debug"));
        assert!(directives.contains("pm_telemetry=debug"));
        assert!(directives.contains("sqlx=warn"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }

    #[test]
    fn test_explicit_level_beats_rust_log() {
        let config = LogConfig::from_vars(
            None,
            Some("info".into()),
            None,
            Some(LogLevel::Debug),
            None,
        );
        let filter = build_filter(&config).to_string();
        assert!(filter.contains("pm_core=debug"), "filter was {filter}");
    }

    #[test]
    fn test_rust_log_used_without_explicit_level() {
        let config = LogConfig::from_vars(None, Some("pm_telemetry=trace".into()), None, None, None);
        let filter = build_filter(&config).to_string();
        assert!(filter.contains("pm_telemetry=trace"), "filter was {filter}");
        assert!(!filter.contains("pm_core"));
    }

    #[test]
    fn test_off_directives_parse() {
        assert!(EnvFilter::try_new(default_directives(LogLevel::Off)).is_ok());
    }
}
