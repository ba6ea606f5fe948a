//! Collection and notification dispatch
//!
//! [`Monitor`] drives one collection pass per domain and turns a committed
//! set of alert types into a single notification. It holds no policy state;
//! the [`Coordinator`](super::Coordinator) owns both policies.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::alerting::{AlertFormatter, AlertPolicy, DumpScript, Evaluator, Notifier, ScriptOutcome, DEFAULT_WAIT};
use crate::collector::{HostCollector, HttpCollector, MySqlCollector, RedisCollector};
use crate::config::{Config, HttpInterfaceConfig, MySqlMonitorConfig};
use crate::error::Result;
use crate::models::{
    AlertType, Decision, HttpInterfaceMetrics, MetricsSnapshot, MySqlMetrics, ProcessInfo,
    RedisMetrics, TriggeredAlert,
};

/// Processes fetched when attributing a CPU or memory alert
pub const TOP_PROCESS_COUNT: usize = 5;

/// Message appended when a dump script kept running in the background
pub const ASYNC_DUMP_NOTICE: &str =
    "High load detected, heap dump triggered asynchronously (still running)...";

/// Collector set consumed by [`Monitor`]
///
/// Redis and MySQL are optional; an enabled section without a collector is
/// reported as that domain's error.
#[derive(Clone)]
pub struct Collectors {
    /// Host metrics
    pub host: Arc<dyn HostCollector>,
    /// HTTP probes
    pub http: Arc<dyn HttpCollector>,
    /// Redis client count
    pub redis: Option<Arc<dyn RedisCollector>>,
    /// MySQL status
    pub mysql: Option<Arc<dyn MySqlCollector>>,
}

/// Collection, evaluation and notification for both domains
pub struct Monitor {
    collectors: Collectors,
    evaluator: Evaluator,
    formatter: Arc<dyn AlertFormatter>,
    notifier: Arc<dyn Notifier>,
    dump_wait: Duration,
    http_ready: OnceCell<()>,
    redis_ready: OnceCell<()>,
    mysql_ready: OnceCell<()>,
}

/// Outcome of enriching one alert type
enum Enriched {
    Keep { message: String, detached: bool },
    Whitelisted,
}

impl Monitor {
    /// Create a monitor
    pub fn new(
        collectors: Collectors,
        formatter: Arc<dyn AlertFormatter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            collectors,
            evaluator: Evaluator::new(),
            formatter,
            notifier,
            dump_wait: DEFAULT_WAIT,
            http_ready: OnceCell::new(),
            redis_ready: OnceCell::new(),
            mysql_ready: OnceCell::new(),
        }
    }

    /// Override how long dispatch waits for the dump script
    #[must_use]
    pub fn with_dump_wait(mut self, wait: Duration) -> Self {
        self.dump_wait = wait;
        self
    }

    /// Run the evaluator against `snapshot`
    pub fn evaluate(&self, config: &Config, snapshot: &MetricsSnapshot) -> Vec<Decision> {
        self.evaluator.evaluate(config, snapshot)
    }

    /// Collect host, Redis and MySQL readings for every enabled section
    pub async fn collect_base_once(&self, config: &Config) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::now();

        if config.host().is_some() {
            let host = &self.collectors.host;

            match host.cpu_percent().await {
                Ok(percent) => snapshot.cpu.percent = percent,
                Err(e) => snapshot.cpu.error = Some(e.to_string()),
            }
            match host.memory_usage().await {
                Ok(mem) => {
                    snapshot.memory.percent = mem.percent;
                    snapshot.memory.used_mb = mem.used_mb;
                    snapshot.memory.total_mb = mem.total_mb;
                }
                Err(e) => snapshot.memory.error = Some(e.to_string()),
            }
            match host.disk_usage().await {
                Ok(disk) => {
                    snapshot.disk.percent = disk.percent;
                    snapshot.disk.used_gb = disk.used_gb;
                    snapshot.disk.total_gb = disk.total_gb;
                }
                Err(e) => snapshot.disk.error = Some(e.to_string()),
            }
            // Disk IO is informational only; a failure leaves the rates at zero.
            match host.disk_io_rate().await {
                Ok(rate) => {
                    snapshot.disk.read_kbps = rate.inbound_kbps;
                    snapshot.disk.write_kbps = rate.outbound_kbps;
                }
                Err(e) => debug!(error = %e, "Disk IO rate unavailable"),
            }
            match host.network_rate().await {
                Ok(rate) => {
                    snapshot.network.download_kbps = rate.inbound_kbps;
                    snapshot.network.upload_kbps = rate.outbound_kbps;
                }
                Err(e) => snapshot.network.error = Some(e.to_string()),
            }
        }

        if config.redis().is_some() {
            snapshot.redis = self.collect_redis().await;
        }
        if let Some(mysql) = config.mysql() {
            snapshot.mysql = self.collect_mysql(mysql).await;
        }

        snapshot
    }

    async fn collect_redis(&self) -> RedisMetrics {
        let mut metrics = RedisMetrics::default();
        let Some(redis) = &self.collectors.redis else {
            metrics.error = Some("Redis collector not configured".to_string());
            return metrics;
        };

        if let Err(e) = self.redis_ready.get_or_try_init(|| redis.init()).await {
            metrics.error = Some(e.to_string());
            return metrics;
        }
        match redis.client_count().await {
            Ok(count) => metrics.client_count = count,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        metrics
    }

    async fn collect_mysql(&self, config: &MySqlMonitorConfig) -> MySqlMetrics {
        let mut metrics = MySqlMetrics::default();
        let Some(mysql) = &self.collectors.mysql else {
            metrics.error = Some("MySQL collector not configured".to_string());
            return metrics;
        };

        if let Err(e) = self.mysql_ready.get_or_try_init(|| mysql.init()).await {
            metrics.error = Some(e.to_string());
            return metrics;
        }

        // Each reading is independent; the last failure wins the error slot.
        match mysql.connection_metrics().await {
            Ok(m) => metrics.connections = m,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        match mysql.query_metrics().await {
            Ok(m) => metrics.queries = m,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        match mysql.buffer_pool_metrics().await {
            Ok(m) => metrics.buffer_pool = m,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        match mysql.lock_metrics().await {
            Ok(m) => metrics.locks = m,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        match mysql.transaction_metrics().await {
            Ok(m) => metrics.transactions = m,
            Err(e) => metrics.error = Some(e.to_string()),
        }
        if config.replication_enabled() {
            match mysql.replication_metrics().await {
                Ok(m) => metrics.replication = Some(m),
                Err(e) => metrics.error = Some(e.to_string()),
            }
        }
        metrics
    }

    /// Probe every configured HTTP interface concurrently
    pub async fn collect_http_once(&self, config: &Config) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::now();
        let Some(http) = config.http() else {
            return snapshot;
        };

        let collector = &self.collectors.http;
        if let Err(e) = self.http_ready.get_or_try_init(|| collector.init()).await {
            snapshot.http.error = Some(e.to_string());
            return snapshot;
        }

        snapshot.http.interfaces = join_all(http.interfaces.iter().map(|iface| self.probe(iface))).await;
        snapshot
    }

    async fn probe(&self, iface: &HttpInterfaceConfig) -> HttpInterfaceMetrics {
        let mut metrics = HttpInterfaceMetrics {
            name: iface.name.clone(),
            url: iface.url.clone(),
            need_alert: iface.need_alert,
            allowed_codes: iface.allowed_codes.clone(),
            ..Default::default()
        };
        match self.collectors.http.check_interface(&iface.url, iface.timeout).await {
            Ok(probe) => {
                metrics.accessible = probe.accessible;
                metrics.response_time = probe.response_time;
                metrics.status_code = probe.status_code;
                metrics.error = probe.error;
            }
            Err(e) => metrics.error = Some(e.to_string()),
        }
        metrics
    }

    /// Log every enabled reading
    pub fn print_metrics(&self, config: &Config, snapshot: &MetricsSnapshot) {
        if config.host().is_some() {
            match &snapshot.cpu.error {
                Some(e) => warn!(error = %e, "CPU collection failed"),
                None => info!(percent = snapshot.cpu.percent, "CPU usage"),
            }
            match &snapshot.memory.error {
                Some(e) => warn!(error = %e, "Memory collection failed"),
                None => info!(
                    percent = snapshot.memory.percent,
                    used_mb = snapshot.memory.used_mb,
                    total_mb = snapshot.memory.total_mb,
                    "Memory usage"
                ),
            }
            match &snapshot.disk.error {
                Some(e) => warn!(error = %e, "Disk collection failed"),
                None => info!(
                    percent = snapshot.disk.percent,
                    used_gb = snapshot.disk.used_gb,
                    total_gb = snapshot.disk.total_gb,
                    "Disk usage"
                ),
            }
            match &snapshot.network.error {
                Some(e) => warn!(error = %e, "Network collection failed"),
                None => info!(
                    download_kbps = snapshot.network.download_kbps,
                    upload_kbps = snapshot.network.upload_kbps,
                    "Network throughput"
                ),
            }
            info!(
                read_kbps = snapshot.disk.read_kbps,
                write_kbps = snapshot.disk.write_kbps,
                "Disk IO"
            );
        }

        if config.redis().is_some() {
            match &snapshot.redis.error {
                Some(e) => warn!(error = %e, "Redis collection failed"),
                None => info!(clients = snapshot.redis.client_count, "Redis clients"),
            }
        }

        if config.mysql().is_some() {
            let mysql = &snapshot.mysql;
            match &mysql.error {
                Some(e) => warn!(error = %e, "MySQL collection failed"),
                None => info!(
                    connected = mysql.connections.threads_connected,
                    max = mysql.connections.max_connections,
                    usage = mysql.connections.usage_percent,
                    qps = mysql.queries.qps,
                    slow_queries = mysql.queries.slow_queries,
                    buffer_pool_hit_rate = mysql.buffer_pool.hit_rate,
                    "MySQL status"
                ),
            }
        }

        if config.http().is_some() {
            if let Some(e) = &snapshot.http.error {
                warn!(error = %e, "HTTP probing failed");
            }
            for iface in &snapshot.http.interfaces {
                let mode = if iface.need_alert { "alerting" } else { "watch-only" };
                if iface.is_status_allowed() {
                    info!(
                        name = %iface.name,
                        mode,
                        status = iface.status_code,
                        response_time = ?iface.response_time,
                        "HTTP interface healthy"
                    );
                } else {
                    warn!(
                        name = %iface.name,
                        mode,
                        status = iface.status_code,
                        error = iface.error.as_deref().unwrap_or(""),
                        "HTTP interface unhealthy"
                    );
                }
            }
        }
    }

    /// Evaluate, filter through `policy` for its own domain, and dispatch
    pub async fn evaluate_and_notify(
        &self,
        config: &Config,
        snapshot: &MetricsSnapshot,
        policy: &AlertPolicy,
    ) -> Result<()> {
        let decisions = self.evaluate(config, snapshot);
        let alert_types = policy.apply(config, &policy.domain().restrict(&decisions));
        self.notify_with_alert_types(config, snapshot, &alert_types).await
    }

    /// Build and send one notification for `alert_types`
    ///
    /// CPU and memory alerts are attributed to their top process. Alerts
    /// whose culprit is whitelisted are dropped; if nothing remains, no
    /// notification is sent. Only the notifier's error is returned.
    pub async fn notify_with_alert_types(
        &self,
        config: &Config,
        snapshot: &MetricsSnapshot,
        alert_types: &[AlertType],
    ) -> Result<()> {
        if alert_types.is_empty() {
            return Ok(());
        }

        let mut alerts = Vec::with_capacity(alert_types.len() + 1);
        let mut dump_detached = false;
        for &alert_type in alert_types {
            match self.enrich(config, snapshot, alert_type).await {
                Enriched::Keep { message, detached } => {
                    dump_detached |= detached;
                    alerts.push(TriggeredAlert::new(alert_type, message));
                }
                Enriched::Whitelisted => {}
            }
        }

        if alerts.is_empty() {
            info!(?alert_types, "Every alert was filtered, notification suppressed");
            return Ok(());
        }
        if dump_detached {
            alerts.push(TriggeredAlert::new(AlertType::Info, ASYNC_DUMP_NOTICE));
        }

        let title = config.alert_title();
        let body = self.formatter.build(title, config, snapshot, &alerts);
        info!(count = alerts.len(), "Sending alert notification");
        self.notifier.send(title, &body).await
    }

    async fn enrich(&self, config: &Config, snapshot: &MetricsSnapshot, alert_type: AlertType) -> Enriched {
        let mut message = alert_type.description().to_string();
        if !matches!(alert_type, AlertType::CpuHigh | AlertType::MemHigh) {
            return Enriched::Keep { message, detached: false };
        }

        let top = match self.collectors.host.top_processes(TOP_PROCESS_COUNT).await {
            Ok(top) => top,
            Err(e) => {
                warn!(error = %e, %alert_type, "Top processes unavailable, sending plain alert");
                return Enriched::Keep { message, detached: false };
            }
        };

        let culprit = if alert_type == AlertType::CpuHigh {
            top.by_cpu.first()
        } else {
            top.by_memory.first()
        };
        if let Some(process) = culprit {
            if process.is_listed_in(&config.white_process_list) {
                info!(
                    process = %process.name,
                    pid = process.pid,
                    %alert_type,
                    "Culprit is whitelisted, alert dropped"
                );
                return Enriched::Whitelisted;
            }
            message = culprit_message(alert_type, snapshot, process);
        }

        let mut detached = false;
        if let Some(path) = config.dump_script_path() {
            match DumpScript::new(path).with_wait(self.dump_wait).run().await {
                ScriptOutcome::Detached => detached = true,
                outcome => {
                    if let Some(hint) = outcome.hint() {
                        let _ = write!(message, "\n\n> hint: {hint}");
                    }
                }
            }
        }

        Enriched::Keep { message, detached }
    }
}

fn culprit_message(alert_type: AlertType, snapshot: &MetricsSnapshot, process: &ProcessInfo) -> String {
    if alert_type == AlertType::CpuHigh {
        format!(
            "CPU usage too high: {:.2}% (culprit: {} PID={} {:.2}% CPU)",
            snapshot.cpu.percent, process.name, process.pid, process.cpu_percent
        )
    } else {
        format!(
            "Memory usage too high: {:.2}% (culprit: {} PID={} {:.1}% MEM, {}MB)",
            snapshot.memory.percent, process.name, process.pid, process.mem_percent, process.mem_rss_mb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuMetrics, MemoryMetrics};

    #[test]
    fn test_culprit_messages() {
        let snapshot = MetricsSnapshot {
            cpu: CpuMetrics {
                percent: 91.234,
                error: None,
            },
            memory: MemoryMetrics {
                percent: 88.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let process = ProcessInfo {
            pid: 4242,
            name: "java".to_string(),
            cpu_percent: 180.5,
            mem_percent: 42.3,
            mem_rss_mb: 2048,
        };

        assert_eq!(
            culprit_message(AlertType::CpuHigh, &snapshot, &process),
            "CPU usage too high: 91.23% (culprit: java PID=4242 180.50% CPU)"
        );
        assert_eq!(
            culprit_message(AlertType::MemHigh, &snapshot, &process),
            "Memory usage too high: 88.50% (culprit: java PID=4242 42.3% MEM, 2048MB)"
        );
    }
}
