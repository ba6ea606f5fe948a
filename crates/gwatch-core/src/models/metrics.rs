//! Metric snapshot models
//!
//! A [`MetricsSnapshot`] bundles every reading taken in one collection tick.
//! Each sub-metric carries either its values or an error message; collection
//! failures are data here and never surface as `Err`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time readings across all monitored domains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// CPU reading
    pub cpu: CpuMetrics,
    /// Memory reading
    pub memory: MemoryMetrics,
    /// Disk usage and IO rate
    pub disk: DiskMetrics,
    /// Network throughput
    pub network: NetworkMetrics,
    /// Redis client count
    pub redis: RedisMetrics,
    /// MySQL status
    pub mysql: MySqlMetrics,
    /// HTTP probe results
    pub http: HttpMetrics,
}

impl MetricsSnapshot {
    /// Empty snapshot stamped now
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            ..Self::default()
        }
    }

    /// Combine base-domain readings with HTTP readings into a new snapshot stamped now
    ///
    /// Either side may be missing; its readings are then left at their defaults.
    pub fn merge(base: Option<&MetricsSnapshot>, http: Option<&MetricsSnapshot>) -> Self {
        let mut merged = Self::now();
        if let Some(base) = base {
            merged.cpu = base.cpu.clone();
            merged.memory = base.memory.clone();
            merged.disk = base.disk.clone();
            merged.network = base.network.clone();
            merged.redis = base.redis.clone();
            merged.mysql = base.mysql.clone();
        }
        if let Some(http) = http {
            merged.http = http.http.clone();
        }
        merged
    }
}

/// CPU usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Usage (%)
    pub percent: f64,
    /// Collection failure
    pub error: Option<String>,
}

/// Memory usage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Usage (%)
    pub percent: f64,
    /// Used memory (MB)
    pub used_mb: u64,
    /// Total memory (MB)
    pub total_mb: u64,
    /// Collection failure
    pub error: Option<String>,
}

/// Disk usage of the root filesystem plus aggregate IO rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    /// Usage (%)
    pub percent: f64,
    /// Used space (GB)
    pub used_gb: f64,
    /// Total space (GB)
    pub total_gb: f64,
    /// Read rate (KB/s)
    pub read_kbps: f64,
    /// Write rate (KB/s)
    pub write_kbps: f64,
    /// Collection failure
    pub error: Option<String>,
}

/// Network throughput across all interfaces
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Receive rate (KB/s)
    pub download_kbps: f64,
    /// Transmit rate (KB/s)
    pub upload_kbps: f64,
    /// Collection failure
    pub error: Option<String>,
}

/// Redis client count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedisMetrics {
    /// Connected clients
    pub client_count: i64,
    /// Connection failure
    pub error: Option<String>,
}

/// MySQL status readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlMetrics {
    /// Connections and threads
    pub connections: MySqlConnectionMetrics,
    /// Query counters
    pub queries: MySqlQueryMetrics,
    /// InnoDB buffer pool
    pub buffer_pool: MySqlBufferPoolMetrics,
    /// Lock counters
    pub locks: MySqlLockMetrics,
    /// Open transactions
    pub transactions: MySqlTransactionMetrics,
    /// Replica status, present only when replication is monitored
    pub replication: Option<MySqlReplicationMetrics>,
    /// Last failure seen while collecting
    pub error: Option<String>,
}

/// MySQL connection and thread counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlConnectionMetrics {
    /// `Threads_connected`
    pub threads_connected: i64,
    /// `Threads_running`
    pub threads_running: i64,
    /// `max_connections`
    pub max_connections: i64,
    /// `Aborted_connects`
    pub aborted_connects: i64,
    /// Connected / max (%)
    pub usage_percent: f64,
}

/// MySQL query counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlQueryMetrics {
    /// `Questions`
    pub questions: i64,
    /// `Com_select`, used as a QPS approximation
    pub qps: i64,
    /// `Slow_queries`
    pub slow_queries: i64,
    /// `Com_commit`
    pub committed: i64,
    /// `Com_rollback`
    pub rolled_back: i64,
}

/// InnoDB buffer pool readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlBufferPoolMetrics {
    /// Logical reads served from memory (%)
    pub hit_rate: f64,
    /// Data pages / total pages (%)
    pub usage_percent: f64,
    /// `Innodb_buffer_pool_read_requests`
    pub read_requests: i64,
    /// `Innodb_buffer_pool_reads`
    pub reads: i64,
    /// `Innodb_buffer_pool_pages_total`
    pub pages_total: i64,
    /// `Innodb_buffer_pool_pages_data`
    pub pages_data: i64,
}

/// MySQL lock counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlLockMetrics {
    /// `Innodb_row_lock_waits`
    pub row_lock_waits: i64,
    /// `Innodb_row_lock_time` (ms)
    pub row_lock_time_ms: i64,
    /// `Innodb_deadlocks`
    pub deadlocks: i64,
}

/// Open InnoDB transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlTransactionMetrics {
    /// Rows in `INNODB_TRX`
    pub uncommitted: i64,
}

/// Replica status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MySqlReplicationMetrics {
    /// `Slave_IO_Running`
    pub io_running: String,
    /// `Slave_SQL_Running`
    pub sql_running: String,
    /// `Seconds_Behind_Master`
    pub seconds_behind_master: i64,
}

/// HTTP probe results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpMetrics {
    /// Per-interface results, in configuration order
    pub interfaces: Vec<HttpInterfaceMetrics>,
    /// Collector-level failure
    pub error: Option<String>,
}

/// One probed interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpInterfaceMetrics {
    /// Display name
    pub name: String,
    /// Target URL
    pub url: String,
    /// Whether the request completed and was judged healthy
    pub accessible: bool,
    /// Round-trip time
    #[serde(with = "humantime_serde")]
    pub response_time: Duration,
    /// HTTP status, or the business code from a JSON envelope
    pub status_code: u16,
    /// Probe failure
    pub error: Option<String>,
    /// Whether a failure here counts toward the HTTP alert
    pub need_alert: bool,
    /// Accepted status codes (only 200 when empty)
    pub allowed_codes: Vec<u16>,
}

impl HttpInterfaceMetrics {
    /// Whether the observed status is in the accepted set
    pub fn is_status_allowed(&self) -> bool {
        if self.allowed_codes.is_empty() {
            self.status_code == 200
        } else {
            self.allowed_codes.contains(&self.status_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200, vec![], true)]
    #[case(204, vec![], false)]
    #[case(204, vec![200, 204], true)]
    #[case(500, vec![200, 204], false)]
    #[case(200, vec![301], false)]
    fn test_status_allowed(#[case] status: u16, #[case] allowed: Vec<u16>, #[case] expected: bool) {
        let probe = HttpInterfaceMetrics {
            status_code: status,
            allowed_codes: allowed,
            ..Default::default()
        };
        assert_eq!(probe.is_status_allowed(), expected);
    }

    #[test]
    fn test_merge_takes_each_domain_from_its_side() {
        let mut base = MetricsSnapshot::now();
        base.cpu.percent = 91.0;
        base.http.error = Some("stale".to_string());

        let mut http = MetricsSnapshot::now();
        http.cpu.percent = 1.0;
        http.http.interfaces.push(HttpInterfaceMetrics {
            name: "health".to_string(),
            status_code: 503,
            ..Default::default()
        });

        let merged = MetricsSnapshot::merge(Some(&base), Some(&http));
        assert_eq!(merged.cpu.percent, 91.0);
        assert_eq!(merged.http.error, None);
        assert_eq!(merged.http.interfaces.len(), 1);
        assert!(merged.timestamp >= base.timestamp);
    }

    #[test]
    fn test_merge_with_missing_sides() {
        let merged = MetricsSnapshot::merge(None, None);
        assert_eq!(merged.cpu, CpuMetrics::default());
        assert!(merged.http.interfaces.is_empty());
    }
}
