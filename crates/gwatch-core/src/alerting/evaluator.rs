//! Threshold evaluation
//!
//! The evaluator compares one [`MetricsSnapshot`] against the configured
//! thresholds and reports every breached condition. It keeps no state:
//! streaks and debouncing live in [`AlertPolicy`](super::AlertPolicy).

use crate::config::{Config, MySqlMonitorConfig};
use crate::models::{AlertType, Decision, MetricsSnapshot};

/// Collection domain that owns a subset of alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Host, Redis and MySQL readings
    Base,
    /// HTTP probe readings
    Http,
}

impl Domain {
    /// Whether `alert_type` belongs to this domain
    pub fn owns(self, alert_type: AlertType) -> bool {
        match self {
            Self::Http => alert_type == AlertType::HttpError,
            Self::Base => alert_type != AlertType::HttpError,
        }
    }

    /// The other domain
    pub fn other(self) -> Self {
        match self {
            Self::Base => Self::Http,
            Self::Http => Self::Base,
        }
    }

    /// Keep only the decisions this domain owns
    pub fn restrict(self, decisions: &[Decision]) -> Vec<Decision> {
        decisions
            .iter()
            .copied()
            .filter(|d| self.owns(d.alert_type))
            .collect()
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => f.write_str("base"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Stateless threshold evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Create a new evaluator
    pub fn new() -> Self {
        Self
    }

    /// Report every threshold breach found in `snapshot`
    ///
    /// Disabled sections are skipped. A collection error on a sub-metric
    /// yields its error type and suppresses that metric's threshold check.
    pub fn evaluate(&self, config: &Config, snapshot: &MetricsSnapshot) -> Vec<Decision> {
        let mut decisions = Vec::new();
        let mut emit = |t: AlertType| decisions.push(Decision::new(t));

        if let Some(host) = config.host() {
            if snapshot.cpu.error.is_some() {
                emit(AlertType::CpuError);
            } else if snapshot.cpu.percent > host.cpu_threshold {
                emit(AlertType::CpuHigh);
            }

            if snapshot.memory.error.is_some() {
                emit(AlertType::MemError);
            } else if snapshot.memory.percent > host.memory_threshold {
                emit(AlertType::MemHigh);
            }

            if snapshot.disk.error.is_some() {
                emit(AlertType::DiskError);
            } else if snapshot.disk.percent > host.disk_threshold {
                emit(AlertType::DiskHigh);
            }

            if snapshot.network.error.is_some() {
                emit(AlertType::NetworkError);
            }
        }

        if let Some(redis) = config.redis() {
            if snapshot.redis.error.is_some() {
                emit(AlertType::RedisError);
            } else if snapshot.redis.client_count < redis.min_clients {
                emit(AlertType::RedisLow);
            } else if snapshot.redis.client_count > redis.max_clients {
                emit(AlertType::RedisHigh);
            }
        }

        if let Some(mysql) = config.mysql() {
            if snapshot.mysql.error.is_some() {
                emit(AlertType::MySqlConnError);
            } else {
                evaluate_mysql(mysql, snapshot, &mut emit);
            }
        }

        if let Some(http) = config.http() {
            if snapshot.http.error.is_some() {
                emit(AlertType::HttpError);
            } else {
                let failing = snapshot
                    .http
                    .interfaces
                    .iter()
                    .filter(|i| i.need_alert && !i.is_status_allowed())
                    .count();
                if failing > http.error_threshold {
                    emit(AlertType::HttpError);
                }
            }
        }

        decisions
    }
}

fn evaluate_mysql(
    mysql: &MySqlMonitorConfig,
    snapshot: &MetricsSnapshot,
    emit: &mut impl FnMut(AlertType),
) {
    let t = &mysql.thresholds;
    let m = &snapshot.mysql;

    // Zero readings mean the counter was not collected.
    if m.connections.threads_connected > 0 && m.connections.usage_percent > t.max_connections_usage_warning {
        emit(AlertType::MySqlConnHigh);
    }
    if m.connections.threads_running > t.threads_running_warning {
        emit(AlertType::MySqlThreadsHigh);
    }
    if m.queries.slow_queries > 0 && m.queries.slow_queries > t.slow_queries_rate_warning {
        emit(AlertType::MySqlSlowQuery);
    }
    if m.buffer_pool.hit_rate > 0.0 && m.buffer_pool.hit_rate < t.buffer_pool_hit_rate_warning {
        emit(AlertType::MySqlBufferLow);
    }
    if mysql.replication_enabled() {
        if let Some(repl) = &m.replication {
            if repl.seconds_behind_master > 0
                && repl.seconds_behind_master > t.replication_delay_warning_seconds
            {
                emit(AlertType::MySqlReplDelay);
            }
        }
    }
    if m.locks.deadlocks > 0 && m.locks.deadlocks > t.deadlocks_per_hour_warning {
        emit(AlertType::MySqlDeadlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AppMonitoringConfig, HostMonitoringConfig, HttpMonitorConfig, MySqlMonitorConfig,
        RedisMonitorConfig, ReplicationConfig,
    };
    use crate::models::{HttpInterfaceMetrics, MySqlReplicationMetrics};
    use pretty_assertions::assert_eq;

    fn host_config() -> Config {
        Config {
            host_monitoring: Some(HostMonitoringConfig {
                enabled: true,
                cpu_threshold: 80.0,
                memory_threshold: 80.0,
                disk_threshold: 90.0,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn app_config(app: AppMonitoringConfig) -> Config {
        Config {
            app_monitoring: Some(AppMonitoringConfig { enabled: true, ..app }),
            ..Default::default()
        }
    }

    fn types(decisions: &[Decision]) -> Vec<AlertType> {
        decisions.iter().map(|d| d.alert_type).collect()
    }

    #[test]
    fn test_host_thresholds_are_strictly_greater() {
        let config = host_config();
        let mut snapshot = MetricsSnapshot::now();
        snapshot.cpu.percent = 80.0;
        snapshot.memory.percent = 80.1;
        snapshot.disk.percent = 95.0;

        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::MemHigh, AlertType::DiskHigh]);
    }

    #[test]
    fn test_error_suppresses_threshold_check() {
        let config = host_config();
        let mut snapshot = MetricsSnapshot::now();
        snapshot.cpu.percent = 99.0;
        snapshot.cpu.error = Some("read /proc/stat".to_string());
        snapshot.network.error = Some("no interfaces".to_string());

        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::CpuError, AlertType::NetworkError]);
    }

    #[test]
    fn test_disabled_host_is_skipped() {
        let mut config = host_config();
        if let Some(host) = config.host_monitoring.as_mut() {
            host.enabled = false;
        }
        let mut snapshot = MetricsSnapshot::now();
        snapshot.cpu.percent = 100.0;

        assert!(Evaluator::new().evaluate(&config, &snapshot).is_empty());
    }

    #[test]
    fn test_redis_low_when_below_min() {
        let config = app_config(AppMonitoringConfig {
            redis: Some(RedisMonitorConfig {
                enabled: true,
                min_clients: 1,
                max_clients: 100,
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut snapshot = MetricsSnapshot::now();
        snapshot.redis.client_count = 0;

        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::RedisLow]);

        snapshot.redis.client_count = 101;
        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::RedisHigh]);

        snapshot.redis.error = Some("connection refused".to_string());
        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::RedisError]);
    }

    #[test]
    fn test_http_error_is_aggregate() {
        let config = app_config(AppMonitoringConfig {
            http: Some(HttpMonitorConfig {
                enabled: true,
                error_threshold: 1,
                ..Default::default()
            }),
            ..Default::default()
        });
        let failing = |name: &str| HttpInterfaceMetrics {
            name: name.to_string(),
            status_code: 502,
            need_alert: true,
            ..Default::default()
        };
        let mut snapshot = MetricsSnapshot::now();
        snapshot.http.interfaces = vec![failing("orders"), failing("users")];

        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::HttpError]);
    }

    #[test]
    fn test_http_ignores_interfaces_without_need_alert() {
        let config = app_config(AppMonitoringConfig {
            http: Some(HttpMonitorConfig {
                enabled: true,
                error_threshold: 0,
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut snapshot = MetricsSnapshot::now();
        snapshot.http.interfaces = vec![HttpInterfaceMetrics {
            status_code: 500,
            need_alert: false,
            ..Default::default()
        }];

        assert!(Evaluator::new().evaluate(&config, &snapshot).is_empty());

        snapshot.http.error = Some("client not initialised".to_string());
        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::HttpError]);
    }

    #[test]
    fn test_mysql_checks_co_fire() {
        let config = app_config(AppMonitoringConfig {
            mysql: Some(MySqlMonitorConfig {
                enabled: true,
                replication: Some(ReplicationConfig { enabled: true }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut snapshot = MetricsSnapshot::now();
        snapshot.mysql.connections.threads_connected = 95;
        snapshot.mysql.connections.usage_percent = 95.0;
        snapshot.mysql.connections.threads_running = 60;
        snapshot.mysql.buffer_pool.hit_rate = 50.0;
        snapshot.mysql.locks.deadlocks = 6;
        snapshot.mysql.replication = Some(MySqlReplicationMetrics {
            seconds_behind_master: 120,
            ..Default::default()
        });

        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(
            types(&decisions),
            vec![
                AlertType::MySqlConnHigh,
                AlertType::MySqlThreadsHigh,
                AlertType::MySqlBufferLow,
                AlertType::MySqlReplDelay,
                AlertType::MySqlDeadlock,
            ]
        );

        snapshot.mysql.error = Some("access denied".to_string());
        let decisions = Evaluator::new().evaluate(&config, &snapshot);
        assert_eq!(types(&decisions), vec![AlertType::MySqlConnError]);
    }

    #[test]
    fn test_domain_restrict() {
        let decisions = vec![
            Decision::new(AlertType::CpuHigh),
            Decision::new(AlertType::HttpError),
            Decision::new(AlertType::RedisLow),
        ];
        assert_eq!(
            types(&Domain::Http.restrict(&decisions)),
            vec![AlertType::HttpError]
        );
        assert_eq!(
            types(&Domain::Base.restrict(&decisions)),
            vec![AlertType::CpuHigh, AlertType::RedisLow]
        );
        assert_eq!(Domain::Base.other(), Domain::Http);
    }
}
