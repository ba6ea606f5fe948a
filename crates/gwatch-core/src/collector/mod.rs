//! Metric collectors
//!
//! Each collection domain sits behind a narrow async trait so the monitor can
//! run against real backends or test fakes. Collectors report failures as
//! `Err`; the monitor folds them into the snapshot's error fields.

mod host;
mod http;
mod mysql;
mod redis;

pub use self::host::{RateTracker, SysinfoHostCollector, MIN_RATE_INTERVAL};
pub use self::http::{ReqwestHttpCollector, USER_AGENT};
pub use self::mysql::SqlxMySqlCollector;
pub use self::redis::PoolRedisCollector;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    MySqlBufferPoolMetrics, MySqlConnectionMetrics, MySqlLockMetrics, MySqlQueryMetrics,
    MySqlReplicationMetrics, MySqlTransactionMetrics, TopProcesses,
};

/// Memory usage reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryUsage {
    /// Usage (%)
    pub percent: f64,
    /// Used (MB)
    pub used_mb: u64,
    /// Total (MB)
    pub total_mb: u64,
}

/// Disk usage reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskUsage {
    /// Usage (%)
    pub percent: f64,
    /// Used (GB)
    pub used_gb: f64,
    /// Total (GB)
    pub total_gb: f64,
}

/// A pair of byte rates in KB/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IoRate {
    /// Read or receive rate
    pub inbound_kbps: f64,
    /// Write or transmit rate
    pub outbound_kbps: f64,
}

/// Result of probing one HTTP interface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Whether the interface answered and was judged healthy
    pub accessible: bool,
    /// Round-trip time
    pub response_time: Duration,
    /// HTTP status, or business code from a JSON envelope
    pub status_code: u16,
    /// Failure description
    pub error: Option<String>,
}

/// Host-level metrics
#[async_trait]
pub trait HostCollector: Send + Sync {
    /// Overall CPU usage (%)
    async fn cpu_percent(&self) -> Result<f64>;

    /// Physical memory usage
    async fn memory_usage(&self) -> Result<MemoryUsage>;

    /// Usage of the root filesystem
    async fn disk_usage(&self) -> Result<DiskUsage>;

    /// Disk read/write rate; zero on the first sample
    async fn disk_io_rate(&self) -> Result<IoRate>;

    /// Network receive/transmit rate; zero on the first sample
    async fn network_rate(&self) -> Result<IoRate>;

    /// Top `n` processes by CPU and by memory
    async fn top_processes(&self, n: usize) -> Result<TopProcesses>;
}

/// HTTP interface prober
#[async_trait]
pub trait HttpCollector: Send + Sync {
    /// Prepare the client
    async fn init(&self) -> Result<()>;

    /// Probe `url` with a per-request timeout
    async fn check_interface(&self, url: &str, timeout: Duration) -> Result<ProbeResult>;
}

/// Redis client counter
#[async_trait]
pub trait RedisCollector: Send + Sync {
    /// Connect and verify the server answers
    async fn init(&self) -> Result<()>;

    /// Connected clients, excluding the agent's own probe connections
    async fn client_count(&self) -> Result<i64>;
}

/// MySQL status reader
#[async_trait]
pub trait MySqlCollector: Send + Sync {
    /// Open the pool and verify the server answers
    async fn init(&self) -> Result<()>;

    /// Connection and thread counters
    async fn connection_metrics(&self) -> Result<MySqlConnectionMetrics>;

    /// Query counters
    async fn query_metrics(&self) -> Result<MySqlQueryMetrics>;

    /// InnoDB buffer pool readings
    async fn buffer_pool_metrics(&self) -> Result<MySqlBufferPoolMetrics>;

    /// Lock counters
    async fn lock_metrics(&self) -> Result<MySqlLockMetrics>;

    /// Open transactions
    async fn transaction_metrics(&self) -> Result<MySqlTransactionMetrics>;

    /// Replica status
    async fn replication_metrics(&self) -> Result<MySqlReplicationMetrics>;
}
