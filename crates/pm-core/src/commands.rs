//! Command implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pm_common::{ResolvedConfig, ServiceConfig, SinkConfig};
use pm_telemetry::{build_sink, MetricSink, MetricsBatcher, PostgresSink, StatsSnapshot};
use serde::Serialize;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::cli::{ConfigArgs, RunArgs};
use crate::error::CliError;
use crate::exit_codes::ExitCode;
use crate::ingest::{pump_lines, IngestSummary};

/// Upper bound for schema creation during `init-db`.
const INIT_DB_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload printed on stdout when `run` finishes.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub sink: &'static str,
    pub config_source: String,
    pub interrupted: bool,
    pub drained: bool,
    pub input: IngestSummary,
    pub stats: StatsSnapshot,
    /// Accepted records with no confirmed outcome when the process finished.
    pub unsettled: u64,
}

/// Resolve configuration, apply a `--sink` override, then validate.
pub fn load_config(args: &ConfigArgs) -> Result<ResolvedConfig, CliError> {
    let mut resolved = ResolvedConfig::resolve(args.config.as_deref())?;
    if let Some(kind) = args.sink {
        if kind.as_str() != resolved.config.sink.kind() {
            resolved.config.sink = kind.default_config();
            resolved.config = resolved.config.apply_env();
        }
    }
    resolved.config.validate()?;
    info!(
        source = %resolved.source,
        path = ?resolved.path,
        sink = resolved.config.sink.kind(),
        "Configuration loaded"
    );
    Ok(resolved)
}

fn build_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

// ============================================================================
// run
// ============================================================================

pub fn run(args: &RunArgs) -> Result<ExitCode, CliError> {
    let resolved = load_config(&args.config)?;
    let runtime = build_runtime()?;
    let report = runtime.block_on(run_pipeline(
        &resolved,
        Duration::from_secs(args.drain_timeout_secs),
    ));
    // A stdin read may still be parked on a blocking thread after Ctrl-C.
    runtime.shutdown_background();
    let report = report?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.stats.failed_batches > 0 {
        ExitCode::PartialFail
    } else if report.interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Clean
    })
}

async fn run_pipeline(
    resolved: &ResolvedConfig,
    drain_timeout: Duration,
) -> Result<RunReport, CliError> {
    let ServiceConfig { batcher, sink } = &resolved.config;

    let mut postgres = None;
    let store: Arc<dyn MetricSink> = match sink {
        SinkConfig::Postgres { .. } => {
            let pg = Arc::new(PostgresSink::connect_lazy(sink)?);
            let warm = pg.clone();
            tokio::spawn(async move {
                warm.warm_up().await;
            });
            postgres = Some(pg.clone());
            pg
        }
        other => build_sink(other)?,
    };

    let metrics = MetricsBatcher::spawn(batcher, store);
    let handle = metrics.handle();

    let mut input = IngestSummary::default();
    let stdin = BufReader::new(tokio::io::stdin());
    let outcome = tokio::select! {
        res = pump_lines(stdin, &handle, &mut input) => res.map(|()| false),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(true)
        }
    };

    let drained = handle.wait_drained(drain_timeout).await;
    if !drained {
        warn!(
            pending = handle.pending(),
            "Input queue not drained before shutdown; queued records will be lost"
        );
    }
    let stats = metrics.shutdown().await;
    if let Some(pg) = postgres {
        pg.close().await;
    }
    let interrupted = outcome?;

    if stats.unsettled() > 0 {
        warn!(
            unsettled = stats.unsettled(),
            "Some writes were still in flight at exit; their outcome is unknown"
        );
    }

    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        flushed = stats.flushed_records,
        failed = stats.failed_records,
        "Metrics run complete"
    );

    Ok(RunReport {
        sink: sink.kind(),
        config_source: resolved.source.to_string(),
        interrupted,
        drained,
        input,
        unsettled: stats.unsettled(),
        stats,
    })
}

// ============================================================================
// check-config
// ============================================================================

#[derive(Debug, Serialize)]
struct ConfigReport<'a> {
    source: String,
    path: Option<&'a PathBuf>,
    config: serde_json::Value,
}

pub fn check_config(args: &ConfigArgs) -> Result<ExitCode, CliError> {
    let resolved = load_config(args)?;
    let mut config = serde_json::to_value(&resolved.config)?;
    if let Some(url) = config
        .pointer_mut("/sink/database_url")
        .and_then(|v| v.as_str().map(redact_database_url))
    {
        config["sink"]["database_url"] = serde_json::Value::String(url);
    }

    let report = ConfigReport {
        source: resolved.source.to_string(),
        path: resolved.path.as_ref(),
        config,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::Clean)
}

/// Mask the password in a connection URL, keeping the user and host readable.
pub fn redact_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &userinfo[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}

// ============================================================================
// init-db
// ============================================================================

pub fn init_db(args: &ConfigArgs) -> Result<ExitCode, CliError> {
    let resolved = load_config(args)?;
    let sink = &resolved.config.sink;
    if !matches!(sink, SinkConfig::Postgres { .. }) {
        return Err(CliError::WrongSink {
            command: "init-db",
            expected: "postgres",
            actual: sink.kind(),
        });
    }

    let runtime = build_runtime()?;
    let table = runtime.block_on(async {
        let pg = PostgresSink::connect_lazy(sink)?;
        let result = tokio::time::timeout(INIT_DB_TIMEOUT, pg.ensure_schema()).await;
        pg.close().await;
        match result {
            Ok(Ok(())) => Ok(pg.table().to_string()),
            Ok(Err(e)) => Err(CliError::from(e)),
            Err(_) => Err(CliError::Timeout {
                operation: "schema creation",
                timeout: INIT_DB_TIMEOUT,
            }),
        }
    })?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "table": table, "status": "ready" }))?
    );
    Ok(ExitCode::Clean)
}
