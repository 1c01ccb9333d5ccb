//! PostgreSQL sink: one UNNEST-based bulk insert per batch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pm_common::config::is_valid_identifier;
use pm_common::{MetricRecord, SinkConfig};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument, warn};

use super::{MetricSink, SinkError, SinkResult};
use crate::events;

/// Warm-up attempts before giving up on an idle (possibly suspended) database.
const WARMUP_ATTEMPTS: u32 = 3;

/// Delay before each warm-up ping.
const WARMUP_DELAY: Duration = Duration::from_millis(500);

/// Per-ping timeout during warm-up.
const WARMUP_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Bulk-insert sink backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresSink {
    pool: PgPool,
    table: String,
    insert_sql: String,
}

/// Column-major view of a batch, shaped for array binds.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ColumnArrays<'a> {
    pub device_ids: Vec<&'a str>,
    pub latencies: Vec<Option<f64>>,
    pub losses: Vec<Option<f64>>,
    pub bandwidths: Vec<Option<f64>>,
    pub is_down: Vec<Option<bool>>,
    pub timestamps: Vec<DateTime<Utc>>,
}

impl<'a> ColumnArrays<'a> {
    pub(crate) fn from_records(records: &'a [MetricRecord]) -> Self {
        let mut cols = ColumnArrays {
            device_ids: Vec::with_capacity(records.len()),
            latencies: Vec::with_capacity(records.len()),
            losses: Vec::with_capacity(records.len()),
            bandwidths: Vec::with_capacity(records.len()),
            is_down: Vec::with_capacity(records.len()),
            timestamps: Vec::with_capacity(records.len()),
        };
        for r in records {
            cols.device_ids.push(r.subject_id());
            cols.latencies.push(r.latency());
            cols.losses.push(r.loss());
            cols.bandwidths.push(r.bandwidth());
            cols.is_down.push(r.is_down());
            cols.timestamps.push(r.timestamp());
        }
        cols
    }
}

/// Builds the single-statement bulk insert for `table`.
///
/// Six parallel arrays are unnested into rows, so a batch costs one round trip
/// regardless of its size.
pub(crate) fn build_insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (device_id, latency, loss, bandwidth, is_down, timestamp) \
         SELECT * FROM UNNEST($1::text[], $2::float8[], $3::float8[], $4::float8[], $5::bool[], $6::timestamptz[])"
    )
}

/// Builds the DDL for the metrics table.
pub(crate) fn build_create_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id BIGSERIAL PRIMARY KEY,
            device_id VARCHAR(255) NOT NULL,
            latency DOUBLE PRECISION,
            loss DOUBLE PRECISION,
            bandwidth DOUBLE PRECISION,
            is_down BOOLEAN,
            timestamp TIMESTAMP WITH TIME ZONE NOT NULL
        )
        "#
    )
}

impl PostgresSink {
    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, table: &str) -> SinkResult<Self> {
        if !is_valid_identifier(table) {
            return Err(SinkError::InvalidInput {
                message: format!("'{}' is not a plain SQL identifier", table),
            });
        }
        Ok(PostgresSink {
            pool,
            table: table.to_string(),
            insert_sql: build_insert_sql(table),
        })
    }

    /// Configure a pool without opening a connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect_lazy(config: &SinkConfig) -> SinkResult<Self> {
        let SinkConfig::Postgres {
            database_url,
            table,
            max_connections,
            min_connections,
            idle_timeout_secs,
            max_lifetime_secs,
            connect_timeout_secs,
        } = config
        else {
            return Err(SinkError::InvalidInput {
                message: format!("expected a postgres sink config, got '{}'", config.kind()),
            });
        };

        let pool = PgPoolOptions::new()
            .max_connections(*max_connections)
            .min_connections(*min_connections)
            .idle_timeout(Some(Duration::from_secs(*idle_timeout_secs)))
            .max_lifetime(Some(Duration::from_secs(*max_lifetime_secs)))
            .acquire_timeout(Duration::from_secs(*connect_timeout_secs))
            .connect_lazy(database_url)
            .map_err(|e| SinkError::Connection {
                message: e.to_string(),
            })?;

        debug!(
            table = %table,
            max_connections = *max_connections,
            "Database pool configured (lazy connection)"
        );
        Self::from_pool(pool, table)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the metrics table if it does not exist.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn ensure_schema(&self) -> SinkResult<()> {
        sqlx::query(&build_create_table_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::Query {
                message: format!("Failed to create {} table: {e}", self.table),
            })?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_device_time ON {table} (device_id, timestamp DESC)",
            table = self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| SinkError::Query {
            message: format!("Failed to create {} index: {e}", self.table),
        })?;

        info!(event = events::SINK_SCHEMA, table = %self.table, "Metrics table ready");
        Ok(())
    }

    /// Ping the database a few times so the first flush does not pay for a cold start.
    ///
    /// Never fails; returns whether a ping succeeded.
    pub async fn warm_up(&self) -> bool {
        for attempt in 1..=WARMUP_ATTEMPTS {
            tokio::time::sleep(WARMUP_DELAY).await;
            debug!(
                event = events::SINK_WARMUP,
                attempt,
                max_attempts = WARMUP_ATTEMPTS,
                "Pinging database"
            );

            let ping = sqlx::query("SELECT 1").execute(&self.pool);
            match tokio::time::timeout(WARMUP_PING_TIMEOUT, ping).await {
                Ok(Ok(_)) => {
                    info!(event = events::SINK_WARMUP, attempt, "Database is awake and ready");
                    return true;
                }
                Ok(Err(e)) => warn!(event = events::SINK_WARMUP, attempt, error = %e, "Ping failed"),
                Err(_) => warn!(event = events::SINK_WARMUP, attempt, "Ping timed out"),
            }
        }
        warn!(
            event = events::SINK_WARMUP,
            "Database warm-up failed after retries; first flush might be slow"
        );
        false
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetricSink for PostgresSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn write_batch(&self, batch: &[MetricRecord]) -> SinkResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let cols = ColumnArrays::from_records(batch);

        let result = sqlx::query(&self.insert_sql)
            .bind(&cols.device_ids)
            .bind(&cols.latencies)
            .bind(&cols.losses)
            .bind(&cols.bandwidths)
            .bind(&cols.is_down)
            .bind(&cols.timestamps)
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::Query {
                message: format!("Failed to bulk insert metrics: {e}"),
            })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_insert_sql_shape() {
        let sql = build_insert_sql("network_metrics");
        assert!(sql.starts_with("INSERT INTO network_metrics (device_id, latency, loss, bandwidth, is_down, timestamp)"));
        assert!(sql.contains("UNNEST($1::text[], $2::float8[], $3::float8[], $4::float8[], $5::bool[], $6::timestamptz[])"));
    }

    #[test]
    fn test_create_table_nullable_measurements() {
        let sql = build_create_table_sql("network_metrics");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS network_metrics"));
        assert!(sql.contains("latency DOUBLE PRECISION,"));
        assert!(sql.contains("is_down BOOLEAN,"));
        assert!(sql.contains("device_id VARCHAR(255) NOT NULL"));
    }

    #[test]
    fn test_column_arrays_preserve_order_and_nulls() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 14, 30, 22).unwrap();
        let records = vec![
            MetricRecord::new("dev-1", ts)
                .with_latency(None)
                .with_loss(Some(0.0)),
            MetricRecord::new("dev-2", ts)
                .with_bandwidth(Some(100.0))
                .with_is_down(Some(true)),
        ];
        let cols = ColumnArrays::from_records(&records);
        assert_eq!(cols.device_ids, vec!["dev-1", "dev-2"]);
        assert_eq!(cols.latencies, vec![None, None]);
        assert_eq!(cols.losses, vec![Some(0.0), None]);
        assert_eq!(cols.bandwidths, vec![None, Some(100.0)]);
        assert_eq!(cols.is_down, vec![None, Some(true)]);
        assert_eq!(cols.timestamps, vec![ts, ts]);
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_bad_table() {
        let mut config = SinkConfig::postgres("postgres://localhost/portal");
        if let SinkConfig::Postgres { table, .. } = &mut config {
            *table = "bad-name".to_string();
        }
        let err = PostgresSink::connect_lazy(&config).unwrap_err();
        assert!(matches!(err, SinkError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_connect_lazy_does_not_dial() {
        let sink = PostgresSink::connect_lazy(&SinkConfig::postgres(
            "postgres://nobody@127.0.0.1:1/unreachable",
        ))
        .unwrap();
        assert_eq!(sink.table(), "network_metrics");
        assert_eq!(sink.name(), "postgres");
    }

    #[test]
    fn test_connect_lazy_rejects_other_kinds() {
        let err = PostgresSink::connect_lazy(&SinkConfig::Memory).unwrap_err();
        assert!(matches!(err, SinkError::InvalidInput { .. }));
    }
}
