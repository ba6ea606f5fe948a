//! Alert data models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static metadata attached to every [`AlertType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTypeMeta {
    /// Stable machine-readable code
    pub code: &'static str,
    /// Human-readable description, used as the default alert message
    pub description: &'static str,
    /// Whether the type must hold for several back-to-back ticks before it fires
    pub consecutive: bool,
}

/// Closed set of threshold-breach conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// CPU usage above threshold
    CpuHigh,
    /// CPU collection failed
    CpuError,
    /// Memory usage above threshold
    MemHigh,
    /// Memory collection failed
    MemError,
    /// Disk usage above threshold
    DiskHigh,
    /// Disk collection failed
    DiskError,
    /// Disk read rate too high. Reserved: no threshold is configured, never evaluated
    DiskIoReadHigh,
    /// Disk write rate too high. Reserved: no threshold is configured, never evaluated
    DiskIoWriteHigh,
    /// Too many Redis clients
    RedisHigh,
    /// Too few Redis clients
    RedisLow,
    /// Redis unreachable
    RedisError,
    /// MySQL connection usage above threshold
    #[serde(rename = "mysql_conn_high")]
    MySqlConnHigh,
    /// MySQL unreachable
    #[serde(rename = "mysql_conn_error")]
    MySqlConnError,
    /// Too many running MySQL threads
    #[serde(rename = "mysql_threads_high")]
    MySqlThreadsHigh,
    /// MySQL QPS too high. Reserved: no threshold is configured, never evaluated
    #[serde(rename = "mysql_qps_high")]
    MySqlQpsHigh,
    /// Too many MySQL slow queries
    #[serde(rename = "mysql_slow_query")]
    MySqlSlowQuery,
    /// MySQL buffer pool hit rate below threshold
    #[serde(rename = "mysql_buffer_low")]
    MySqlBufferLow,
    /// MySQL replication lagging
    #[serde(rename = "mysql_repl_delay")]
    MySqlReplDelay,
    /// Too many MySQL row lock waits. Reserved: no threshold is configured, never evaluated
    #[serde(rename = "mysql_lock_wait")]
    MySqlLockWait,
    /// Too many MySQL deadlocks
    #[serde(rename = "mysql_deadlock")]
    MySqlDeadlock,
    /// Long-running uncommitted MySQL transactions. Reserved: no threshold is configured, never evaluated
    #[serde(rename = "mysql_trans_long")]
    MySqlTransLong,
    /// Network collection failed
    NetworkError,
    /// HTTP interfaces unhealthy
    HttpError,
    /// Informational entry appended by the dispatcher
    Info,
}

impl AlertType {
    /// Every alert type, in declaration order
    pub const ALL: [AlertType; 24] = [
        Self::CpuHigh,
        Self::CpuError,
        Self::MemHigh,
        Self::MemError,
        Self::DiskHigh,
        Self::DiskError,
        Self::DiskIoReadHigh,
        Self::DiskIoWriteHigh,
        Self::RedisHigh,
        Self::RedisLow,
        Self::RedisError,
        Self::MySqlConnHigh,
        Self::MySqlConnError,
        Self::MySqlThreadsHigh,
        Self::MySqlQpsHigh,
        Self::MySqlSlowQuery,
        Self::MySqlBufferLow,
        Self::MySqlReplDelay,
        Self::MySqlLockWait,
        Self::MySqlDeadlock,
        Self::MySqlTransLong,
        Self::NetworkError,
        Self::HttpError,
        Self::Info,
    ];

    /// Metadata for this type
    pub const fn meta(self) -> AlertTypeMeta {
        const fn m(code: &'static str, description: &'static str, consecutive: bool) -> AlertTypeMeta {
            AlertTypeMeta {
                code,
                description,
                consecutive,
            }
        }

        match self {
            Self::CpuHigh => m("cpu_high", "CPU usage too high", true),
            Self::CpuError => m("cpu_error", "CPU monitoring failed", false),
            Self::MemHigh => m("mem_high", "Memory usage too high", true),
            Self::MemError => m("mem_error", "Memory monitoring failed", false),
            Self::DiskHigh => m("disk_high", "Disk usage too high", false),
            Self::DiskError => m("disk_error", "Disk monitoring failed", false),
            Self::DiskIoReadHigh => m("disk_io_read_high", "Disk read IO too high", false),
            Self::DiskIoWriteHigh => m("disk_io_write_high", "Disk write IO too high", false),
            Self::RedisHigh => m("redis_high", "Too many Redis connections", false),
            Self::RedisLow => m("redis_low", "Too few Redis connections", false),
            Self::RedisError => m("redis_error", "Redis connection failed", false),
            Self::MySqlConnHigh => m("mysql_conn_high", "MySQL connection usage too high", false),
            Self::MySqlConnError => m("mysql_conn_error", "MySQL connection failed", false),
            Self::MySqlThreadsHigh => m("mysql_threads_high", "Too many running MySQL threads", false),
            Self::MySqlQpsHigh => m("mysql_qps_high", "MySQL QPS too high", false),
            Self::MySqlSlowQuery => m("mysql_slow_query", "Too many MySQL slow queries", false),
            Self::MySqlBufferLow => m("mysql_buffer_low", "MySQL buffer pool hit rate too low", false),
            Self::MySqlReplDelay => m("mysql_repl_delay", "MySQL replication delayed", false),
            Self::MySqlLockWait => m("mysql_lock_wait", "Too many MySQL lock waits", false),
            Self::MySqlDeadlock => m("mysql_deadlock", "MySQL deadlocks detected", false),
            Self::MySqlTransLong => m("mysql_trans_long", "Long uncommitted MySQL transactions", false),
            Self::NetworkError => m("network_error", "Network monitoring failed", false),
            Self::HttpError => m("http_error", "HTTP interface monitoring failed", true),
            Self::Info => m("info", "Information", false),
        }
    }

    /// Stable machine-readable code
    pub const fn code(self) -> &'static str {
        self.meta().code
    }

    /// Human-readable description
    pub const fn description(self) -> &'static str {
        self.meta().description
    }

    /// Whether this type requires a streak of breaches before firing
    pub const fn requires_consecutive(self) -> bool {
        self.meta().consecutive
    }

    /// All consecutive-required types
    pub fn consecutive_types() -> impl Iterator<Item = AlertType> {
        Self::ALL.into_iter().filter(|t| t.requires_consecutive())
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single threshold breach found by the evaluator for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decision {
    /// The breached condition
    pub alert_type: AlertType,
}

impl Decision {
    /// Create a decision for `alert_type`
    pub const fn new(alert_type: AlertType) -> Self {
        Self { alert_type }
    }
}

impl From<AlertType> for Decision {
    fn from(alert_type: AlertType) -> Self {
        Self::new(alert_type)
    }
}

/// A final, enriched alert ready to be formatted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    /// Alert type
    pub alert_type: AlertType,
    /// Human-readable message
    pub message: String,
}

impl TriggeredAlert {
    /// Create a triggered alert
    pub fn new(alert_type: AlertType, message: impl Into<String>) -> Self {
        Self {
            alert_type,
            message: message.into(),
        }
    }

    /// Message text, falling back to the type's description when empty
    pub fn display_text(&self) -> &str {
        if self.message.trim().is_empty() {
            self.alert_type.description()
        } else {
            &self.message
        }
    }
}
