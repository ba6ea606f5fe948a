//! MySQL status readings via sqlx

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tracing::debug;

use super::MySqlCollector;
use crate::config::MySqlMonitorConfig;
use crate::error::{Error, Result};
use crate::models::{
    MySqlBufferPoolMetrics, MySqlConnectionMetrics, MySqlLockMetrics, MySqlQueryMetrics,
    MySqlReplicationMetrics, MySqlTransactionMetrics,
};

type StatusMap = HashMap<String, String>;

/// [`MySqlCollector`] backed by a small sqlx pool
pub struct SqlxMySqlCollector {
    config: MySqlMonitorConfig,
    pool: RwLock<Option<MySqlPool>>,
}

impl SqlxMySqlCollector {
    /// Create a collector; nothing connects until [`init`](MySqlCollector::init)
    pub fn new(config: MySqlMonitorConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn pool(&self) -> Result<MySqlPool> {
        self.pool
            .read()
            .clone()
            .ok_or_else(|| Error::collector("MySQL pool not initialised"))
    }

    async fn global_status(&self) -> Result<StatusMap> {
        let rows = sqlx::query("SHOW GLOBAL STATUS").fetch_all(&self.pool()?).await?;
        Ok(rows
            .iter()
            .filter_map(|row| Some((text_column(row, 0)?, text_column(row, 1)?)))
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect())
    }

    async fn max_connections(&self) -> Result<i64> {
        let row = sqlx::query("SHOW GLOBAL VARIABLES LIKE 'max_connections'")
            .fetch_optional(&self.pool()?)
            .await?;
        Ok(row
            .and_then(|r| text_column(&r, 1))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0))
    }
}

#[async_trait]
impl MySqlCollector for SqlxMySqlCollector {
    async fn init(&self) -> Result<()> {
        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .password(&self.config.password);
        if !self.config.database.is_empty() {
            options = options.database(&self.config.database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(self.config.timeout)
            .connect_with(options)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        debug!(host = %self.config.host, port = self.config.port, "MySQL reachable");

        *self.pool.write() = Some(pool);
        Ok(())
    }

    async fn connection_metrics(&self) -> Result<MySqlConnectionMetrics> {
        let status = self.global_status().await?;
        let max_connections = self.max_connections().await?;
        Ok(connection_metrics(&status, max_connections))
    }

    async fn query_metrics(&self) -> Result<MySqlQueryMetrics> {
        let status = self.global_status().await?;
        Ok(MySqlQueryMetrics {
            questions: require(&status, "questions")?,
            qps: require(&status, "com_select")?,
            slow_queries: require(&status, "slow_queries")?,
            committed: require(&status, "com_commit")?,
            rolled_back: require(&status, "com_rollback")?,
        })
    }

    async fn buffer_pool_metrics(&self) -> Result<MySqlBufferPoolMetrics> {
        let status = self.global_status().await?;
        buffer_pool_metrics(&status)
    }

    async fn lock_metrics(&self) -> Result<MySqlLockMetrics> {
        let status = self.global_status().await?;
        Ok(MySqlLockMetrics {
            row_lock_waits: lookup(&status, "innodb_row_lock_waits"),
            row_lock_time_ms: lookup(&status, "innodb_row_lock_time"),
            deadlocks: lookup(&status, "innodb_deadlocks"),
        })
    }

    async fn transaction_metrics(&self) -> Result<MySqlTransactionMetrics> {
        let uncommitted: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM INFORMATION_SCHEMA.INNODB_TRX")
            .fetch_one(&self.pool()?)
            .await?;
        Ok(MySqlTransactionMetrics { uncommitted })
    }

    async fn replication_metrics(&self) -> Result<MySqlReplicationMetrics> {
        let row = sqlx::query("SHOW SLAVE STATUS")
            .fetch_optional(&self.pool()?)
            .await?;
        let Some(row) = row else {
            return Ok(MySqlReplicationMetrics::default());
        };

        Ok(MySqlReplicationMetrics {
            io_running: named_text(&row, "Slave_IO_Running").unwrap_or_default(),
            sql_running: named_text(&row, "Slave_SQL_Running").unwrap_or_default(),
            seconds_behind_master: named_text(&row, "Seconds_Behind_Master")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        })
    }
}

/// Read a column as text whether the server typed it as a string, integer, or bytes
fn text_column<I>(row: &MySqlRow, index: I) -> Option<String>
where
    I: sqlx::ColumnIndex<MySqlRow> + Copy,
{
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value;
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(|v| v.to_string());
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(index) {
        return value.map(|v| v.to_string());
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn named_text(row: &MySqlRow, name: &str) -> Option<String> {
    text_column(row, name)
}

fn lookup(status: &StatusMap, key: &str) -> i64 {
    status
        .get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn require(status: &StatusMap, key: &str) -> Result<i64> {
    status
        .get(key)
        .ok_or_else(|| Error::collector(format!("status variable {key} missing")))?
        .trim()
        .parse()
        .map_err(|e| Error::collector(format!("status variable {key}: {e}")))
}

fn connection_metrics(status: &StatusMap, max_connections: i64) -> MySqlConnectionMetrics {
    let threads_connected = lookup(status, "threads_connected");
    let usage_percent = if max_connections > 0 {
        threads_connected as f64 / max_connections as f64 * 100.0
    } else {
        0.0
    };
    MySqlConnectionMetrics {
        threads_connected,
        threads_running: lookup(status, "threads_running"),
        max_connections,
        aborted_connects: lookup(status, "aborted_connects"),
        usage_percent,
    }
}

fn buffer_pool_metrics(status: &StatusMap) -> Result<MySqlBufferPoolMetrics> {
    let read_requests = require(status, "innodb_buffer_pool_read_requests")?;
    let reads = require(status, "innodb_buffer_pool_reads")?;
    let pages_total = require(status, "innodb_buffer_pool_pages_total")?;
    let pages_data = require(status, "innodb_buffer_pool_pages_data")?;

    let hit_rate = if read_requests > 0 {
        (read_requests - reads) as f64 / read_requests as f64 * 100.0
    } else {
        0.0
    };
    let usage_percent = if pages_total > 0 {
        pages_data as f64 / pages_total as f64 * 100.0
    } else {
        0.0
    };

    Ok(MySqlBufferPoolMetrics {
        hit_rate,
        usage_percent,
        read_requests,
        reads,
        pages_total,
        pages_data,
    })
}
