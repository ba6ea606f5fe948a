//! Configuration management for GWatch
//!
//! The agent reads a single YAML document. Every monitoring section is
//! optional: an absent section behaves the same as `enabled: false`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path used when neither `--config` nor `GWATCH_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yml";

/// Alert title used when `host_monitoring.alert_title` is empty
pub const DEFAULT_ALERT_TITLE: &str = "GWatch Server Alert";

/// Debounce interval used when no host section is configured
pub const DEFAULT_ALERT_INTERVAL: Duration = Duration::from_secs(120);

/// Consecutive threshold used when no host section is configured
pub const DEFAULT_CONSECUTIVE_THRESHOLD: u32 = 3;

/// Base-domain period used when no host section is configured
pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_secs(5);

/// HTTP-domain period used when no HTTP section is configured
pub const DEFAULT_HTTP_INTERVAL: Duration = Duration::from_secs(10);

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host-level monitoring (CPU, memory, disk, network)
    pub host_monitoring: Option<HostMonitoringConfig>,

    /// Application-level monitoring (Redis, MySQL, HTTP)
    pub app_monitoring: Option<AppMonitoringConfig>,

    /// DingTalk robot settings
    pub dingtalk: DingTalkConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Process names whose CPU/memory alerts are never sent
    #[serde(alias = "whiteProcessList", alias = "whiteprocesslist")]
    pub white_process_list: Vec<String>,

    /// Diagnostic heap-dump script
    #[serde(alias = "javaAppDumpScript", alias = "javaappdumpscript")]
    pub java_app_dump_script: Option<DumpScriptConfig>,
}

/// Host monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostMonitoringConfig {
    /// Whether host monitoring is enabled
    pub enabled: bool,
    /// Collection period of the base domain
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Back-to-back breaches required for consecutive-required alert types
    pub consecutive_threshold: u32,
    /// Minimum time between two notifications of the same alert type
    #[serde(with = "humantime_serde")]
    pub alert_interval: Duration,
    /// Notification title
    pub alert_title: String,
    /// CPU usage threshold (%)
    pub cpu_threshold: f64,
    /// Memory usage threshold (%)
    pub memory_threshold: f64,
    /// Disk usage threshold (%)
    pub disk_threshold: f64,
}

impl Default for HostMonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_BASE_INTERVAL,
            consecutive_threshold: DEFAULT_CONSECUTIVE_THRESHOLD,
            alert_interval: DEFAULT_ALERT_INTERVAL,
            alert_title: String::new(),
            cpu_threshold: 80.0,
            memory_threshold: 80.0,
            disk_threshold: 90.0,
        }
    }
}

/// Application monitoring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMonitoringConfig {
    /// Whether application monitoring is enabled
    pub enabled: bool,
    /// Redis monitoring
    pub redis: Option<RedisMonitorConfig>,
    /// MySQL monitoring
    pub mysql: Option<MySqlMonitorConfig>,
    /// HTTP interface monitoring
    pub http: Option<HttpMonitorConfig>,
}

/// Redis monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisMonitorConfig {
    /// Whether Redis monitoring is enabled
    pub enabled: bool,
    /// `host:port`
    pub addr: String,
    /// Password (empty for none)
    pub password: String,
    /// Database index
    pub db: i64,
    /// Connection and command timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Alert when fewer clients are connected
    pub min_clients: i64,
    /// Alert when more clients are connected
    pub max_clients: i64,
}

impl Default for RedisMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "127.0.0.1:6379".to_string(),
            password: String::new(),
            db: 0,
            timeout: Duration::from_secs(2),
            min_clients: 1,
            max_clients: 1000,
        }
    }
}

/// MySQL monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlMonitorConfig {
    /// Whether MySQL monitoring is enabled
    pub enabled: bool,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// Default schema
    pub database: String,
    /// Connect timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Alert thresholds
    pub thresholds: MySqlThresholds,
    /// Replication checks
    pub replication: Option<ReplicationConfig>,
}

impl Default for MySqlMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: String::new(),
            timeout: Duration::from_secs(5),
            thresholds: MySqlThresholds::default(),
            replication: None,
        }
    }
}

impl MySqlMonitorConfig {
    /// Whether replication metrics should be collected and evaluated
    pub fn replication_enabled(&self) -> bool {
        self.replication.as_ref().is_some_and(|r| r.enabled)
    }
}

/// MySQL alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MySqlThresholds {
    /// Connection usage (%)
    pub max_connections_usage_warning: f64,
    /// Running threads
    pub threads_running_warning: i64,
    /// Slow queries per collection window
    pub slow_queries_rate_warning: i64,
    /// Buffer pool hit rate (%), alert when below
    pub buffer_pool_hit_rate_warning: f64,
    /// Replication delay in seconds
    pub replication_delay_warning_seconds: i64,
    /// Deadlocks per hour
    pub deadlocks_per_hour_warning: i64,
}

impl Default for MySqlThresholds {
    fn default() -> Self {
        Self {
            max_connections_usage_warning: 80.0,
            threads_running_warning: 50,
            slow_queries_rate_warning: 10,
            buffer_pool_hit_rate_warning: 95.0,
            replication_delay_warning_seconds: 30,
            deadlocks_per_hour_warning: 5,
        }
    }
}

/// MySQL replication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Whether replication is monitored
    pub enabled: bool,
}

/// HTTP interface monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpMonitorConfig {
    /// Whether HTTP monitoring is enabled
    pub enabled: bool,
    /// Alert when more than this many alerting interfaces are unhealthy
    pub error_threshold: usize,
    /// Collection period of the HTTP domain, also its debounce interval
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Probed interfaces
    pub interfaces: Vec<HttpInterfaceConfig>,
}

impl Default for HttpMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            error_threshold: 0,
            interval: DEFAULT_HTTP_INTERVAL,
            interfaces: Vec::new(),
        }
    }
}

/// A single probed HTTP interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpInterfaceConfig {
    /// Display name
    pub name: String,
    /// Target URL
    pub url: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Whether a failure of this interface counts toward the HTTP alert
    pub need_alert: bool,
    /// Accepted status codes (only 200 when empty)
    pub allowed_codes: Vec<u16>,
}

impl Default for HttpInterfaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            timeout: Duration::from_secs(5),
            need_alert: false,
            allowed_codes: Vec::new(),
        }
    }
}

/// DingTalk robot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DingTalkConfig {
    /// Robot webhook URL
    pub webhook_url: String,
    /// Signing secret (empty disables signing)
    pub secret: String,
    /// Mobiles mentioned in every message
    pub at_mobiles: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Output mode (console, file or both)
    pub mode: String,
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Log file path for file mode
    pub output: String,
    /// Roll the log file daily
    pub enable_rotation: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            mode: "console".to_string(),
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "logs/gwatch.log".to_string(),
            enable_rotation: false,
        }
    }
}

/// Diagnostic script configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpScriptConfig {
    /// Path of the bash script
    pub path: String,
}

impl Config {
    /// Load configuration from a YAML file, applying `GWATCH__` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("GWATCH")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if let Some(host) = &self.host_monitoring {
            if host.interval.is_zero() {
                return Err(Error::config("host_monitoring.interval must be greater than zero"));
            }
        }
        if let Some(app) = &self.app_monitoring {
            if let Some(http) = &app.http {
                if http.interval.is_zero() {
                    return Err(Error::config("app_monitoring.http.interval must be greater than zero"));
                }
            }
            if let Some(redis) = &app.redis {
                if redis.min_clients > redis.max_clients {
                    return Err(Error::config(format!(
                        "app_monitoring.redis.min_clients ({}) exceeds max_clients ({})",
                        redis.min_clients, redis.max_clients
                    )));
                }
            }
        }
        Ok(())
    }

    /// Host section, if present and enabled
    pub fn host(&self) -> Option<&HostMonitoringConfig> {
        self.host_monitoring.as_ref().filter(|h| h.enabled)
    }

    fn app(&self) -> Option<&AppMonitoringConfig> {
        self.app_monitoring.as_ref().filter(|a| a.enabled)
    }

    /// Redis section, if application monitoring and Redis are both enabled
    pub fn redis(&self) -> Option<&RedisMonitorConfig> {
        self.app()?.redis.as_ref().filter(|r| r.enabled)
    }

    /// MySQL section, if application monitoring and MySQL are both enabled
    pub fn mysql(&self) -> Option<&MySqlMonitorConfig> {
        self.app()?.mysql.as_ref().filter(|m| m.enabled)
    }

    /// HTTP section, if application monitoring and HTTP are both enabled
    pub fn http(&self) -> Option<&HttpMonitorConfig> {
        self.app()?.http.as_ref().filter(|h| h.enabled)
    }

    /// HTTP section regardless of the enabled flags
    pub fn http_section(&self) -> Option<&HttpMonitorConfig> {
        self.app_monitoring.as_ref()?.http.as_ref()
    }

    /// Period of the base-domain loop
    pub fn base_interval(&self) -> Duration {
        self.host_monitoring
            .as_ref()
            .map_or(DEFAULT_BASE_INTERVAL, |h| h.interval)
    }

    /// Period of the HTTP-domain loop
    pub fn http_interval(&self) -> Duration {
        self.http_section().map_or(DEFAULT_HTTP_INTERVAL, |h| h.interval)
    }

    /// Title used for alert notifications
    pub fn alert_title(&self) -> &str {
        self.host_monitoring
            .as_ref()
            .map(|h| h.alert_title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_ALERT_TITLE)
    }

    /// Dump script path, if one is configured
    pub fn dump_script_path(&self) -> Option<&str> {
        self.java_app_dump_script
            .as_ref()
            .map(|s| s.path.trim())
            .filter(|p| !p.is_empty())
    }
}
