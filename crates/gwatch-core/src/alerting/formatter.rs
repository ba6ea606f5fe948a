//! Alert message formatting

use std::fmt::Write as _;
use std::net::{IpAddr, UdpSocket};

use chrono::Local;

use crate::config::Config;
use crate::models::{MetricsSnapshot, TriggeredAlert};

/// Renders a notification body from a snapshot and its triggered alerts
pub trait AlertFormatter: Send + Sync {
    /// Build the message body
    fn build(
        &self,
        title: &str,
        config: &Config,
        snapshot: &MetricsSnapshot,
        alerts: &[TriggeredAlert],
    ) -> String;
}

/// Hostname and primary IP shown in every message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Hostname
    pub hostname: String,
    /// Address of the interface used for outbound traffic
    pub ip: String,
}

impl HostIdentity {
    /// Resolve the identity of the local machine
    pub fn detect() -> Self {
        Self {
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
            ip: outbound_ip().map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
        }
    }
}

// No packets are sent; connecting a UDP socket only selects a route.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// Markdown formatter for DingTalk messages
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    identity: HostIdentity,
}

impl MarkdownFormatter {
    /// Create a formatter for the local host
    pub fn new() -> Self {
        Self::with_identity(HostIdentity::detect())
    }

    /// Create a formatter with a fixed host identity
    pub fn with_identity(identity: HostIdentity) -> Self {
        Self { identity }
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn mark(abnormal: bool) -> &'static str {
    if abnormal {
        "[abnormal]"
    } else {
        "[normal]"
    }
}

impl AlertFormatter for MarkdownFormatter {
    fn build(
        &self,
        title: &str,
        config: &Config,
        m: &MetricsSnapshot,
        alerts: &[TriggeredAlert],
    ) -> String {
        let mut text = format!("## {title}\n\n");

        if !alerts.is_empty() {
            text.push_str("### Triggered alerts\n\n");
            for alert in alerts {
                let _ = write!(text, "> {}\n\n", alert.display_text());
            }
        }

        text.push_str("### Metrics\n\n");
        let _ = write!(
            text,
            "**Host**: {} ({})\n\n",
            self.identity.hostname, self.identity.ip
        );

        if let Some(host) = config.host() {
            match &m.cpu.error {
                Some(err) => {
                    let _ = write!(text, "**CPU**: collection failed - {err}\n\n");
                }
                None => {
                    let _ = write!(
                        text,
                        "**CPU**: {:.2}% {}\n\n",
                        m.cpu.percent,
                        mark(m.cpu.percent > host.cpu_threshold)
                    );
                }
            }
            match &m.memory.error {
                Some(err) => {
                    let _ = write!(text, "**Memory**: collection failed - {err}\n\n");
                }
                None => {
                    let _ = write!(
                        text,
                        "**Memory**: {:.2}% ({}/{} MB) {}\n\n",
                        m.memory.percent,
                        m.memory.used_mb,
                        m.memory.total_mb,
                        mark(m.memory.percent > host.memory_threshold)
                    );
                }
            }
            match &m.disk.error {
                Some(err) => {
                    let _ = write!(text, "**Disk**: collection failed - {err}\n\n");
                }
                None => {
                    let _ = write!(
                        text,
                        "**Disk**: {:.2}% ({:.0}/{:.0} GB) {}\n\n",
                        m.disk.percent,
                        m.disk.used_gb,
                        m.disk.total_gb,
                        mark(m.disk.percent > host.disk_threshold)
                    );
                }
            }
            match &m.network.error {
                Some(err) => {
                    let _ = write!(text, "**Network IO**: collection failed - {err}\n\n");
                }
                None => {
                    let _ = write!(
                        text,
                        "**Network IO**: down {:.2} KB/s | up {:.2} KB/s\n\n",
                        m.network.download_kbps, m.network.upload_kbps
                    );
                }
            }
            let _ = write!(
                text,
                "**Disk IO**: read {:.2} KB/s | write {:.2} KB/s\n\n",
                m.disk.read_kbps, m.disk.write_kbps
            );
        }

        if let Some(redis) = config.redis() {
            match &m.redis.error {
                Some(err) => {
                    let _ = write!(text, "**Redis**: connection failed - {err}\n\n");
                }
                None => {
                    let count = m.redis.client_count;
                    let status = if count < redis.min_clients {
                        "[too few clients]"
                    } else if count > redis.max_clients {
                        "[too many clients]"
                    } else {
                        "[normal]"
                    };
                    let _ = write!(text, "**Redis**: {count} clients {status}\n\n");
                }
            }
        }

        if let Some(mysql) = config.mysql() {
            match &m.mysql.error {
                Some(err) => {
                    let _ = write!(text, "**MySQL**: connection failed - {err}\n\n");
                }
                None => {
                    let t = &mysql.thresholds;
                    let c = &m.mysql.connections;
                    let _ = write!(
                        text,
                        "**MySQL**: {}/{} connections ({:.2}%) {}\n\n",
                        c.threads_connected,
                        c.max_connections,
                        c.usage_percent,
                        mark(c.usage_percent > t.max_connections_usage_warning)
                    );
                    let _ = write!(
                        text,
                        "**MySQL threads running**: {} {}\n\n",
                        c.threads_running,
                        mark(c.threads_running > t.threads_running_warning)
                    );
                    let _ = write!(text, "**MySQL QPS**: {}\n\n", m.mysql.queries.qps);
                    let _ = write!(
                        text,
                        "**MySQL buffer pool**: {:.2}% hit rate {}\n\n",
                        m.mysql.buffer_pool.hit_rate,
                        mark(m.mysql.buffer_pool.hit_rate < t.buffer_pool_hit_rate_warning)
                    );
                    if let Some(repl) = &m.mysql.replication {
                        let _ = write!(
                            text,
                            "**MySQL replication**: IO {} / SQL {}, {}s behind {}\n\n",
                            repl.io_running,
                            repl.sql_running,
                            repl.seconds_behind_master,
                            mark(repl.seconds_behind_master > t.replication_delay_warning_seconds)
                        );
                    }
                }
            }
        }

        if config.http().is_some() {
            if let Some(err) = &m.http.error {
                let _ = write!(text, "**HTTP interfaces**: collection failed - {err}\n\n");
            } else if !m.http.interfaces.is_empty() {
                text.push_str("**HTTP interfaces**:\n\n");
                for probe in &m.http.interfaces {
                    if probe.is_status_allowed() {
                        let _ = writeln!(
                            text,
                            "- {}: normal (status {}, {:?})",
                            probe.name, probe.status_code, probe.response_time
                        );
                    } else {
                        let _ = writeln!(
                            text,
                            "- {}: abnormal (status {}) - {}",
                            probe.name,
                            probe.status_code,
                            probe.error.as_deref().unwrap_or("unexpected status")
                        );
                    }
                }
                text.push('\n');
            }
        }

        let _ = write!(
            text,
            "**Time**: {}\n\n",
            m.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        text
    }
}
