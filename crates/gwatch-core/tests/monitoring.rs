//! Dispatch and coordinator behaviour against fake collectors

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use gwatch::alerting::{AlertFormatter, Domain, Notifier};
use gwatch::collector::{DiskUsage, HostCollector, HttpCollector, IoRate, MemoryUsage, ProbeResult};
use gwatch::models::{AlertType, MetricsSnapshot, ProcessInfo, TopProcesses, TriggeredAlert};
use gwatch::monitor::{Collectors, Coordinator, Monitor, ASYNC_DUMP_NOTICE};
use gwatch::{Config, Error, Result};

struct FakeHost {
    cpu: f64,
    top_culprit: String,
    calls: AtomicUsize,
}

impl FakeHost {
    fn new(cpu: f64, culprit: &str) -> Self {
        Self {
            cpu,
            top_culprit: culprit.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HostCollector for FakeHost {
    async fn cpu_percent(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cpu)
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        Ok(MemoryUsage {
            percent: 40.0,
            used_mb: 4096,
            total_mb: 10240,
        })
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        Ok(DiskUsage {
            percent: 30.0,
            used_gb: 30.0,
            total_gb: 100.0,
        })
    }

    async fn disk_io_rate(&self) -> Result<IoRate> {
        Err(Error::collector("no diskstats"))
    }

    async fn network_rate(&self) -> Result<IoRate> {
        Ok(IoRate::default())
    }

    async fn top_processes(&self, _n: usize) -> Result<TopProcesses> {
        let culprit = ProcessInfo {
            pid: 7,
            name: self.top_culprit.clone(),
            cpu_percent: 95.5,
            mem_percent: 12.0,
            mem_rss_mb: 512,
        };
        Ok(TopProcesses {
            by_cpu: vec![culprit.clone()],
            by_memory: vec![culprit],
        })
    }
}

struct FakeHttp {
    status: u16,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpCollector for FakeHttp {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn check_interface(&self, _url: &str, _timeout: Duration) -> Result<ProbeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeResult {
            accessible: self.status == 200,
            response_time: Duration::from_millis(12),
            status_code: self.status,
            error: None,
        })
    }
}

#[derive(Default)]
struct RecordingFormatter {
    batches: Mutex<Vec<Vec<TriggeredAlert>>>,
}

impl AlertFormatter for RecordingFormatter {
    fn build(&self, title: &str, _: &Config, _: &MetricsSnapshot, alerts: &[TriggeredAlert]) -> String {
        self.batches.lock().push(alerts.to_vec());
        format!("{title}: {} alerts", alerts.len())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<()> {
        self.sent.lock().push((title.to_string(), body.to_string()));
        if self.fail {
            return Err(Error::notify("webhook rejected"));
        }
        Ok(())
    }
}

struct Harness {
    host: Arc<FakeHost>,
    http: Arc<FakeHttp>,
    formatter: Arc<RecordingFormatter>,
    notifier: Arc<RecordingNotifier>,
    monitor: Arc<Monitor>,
}

impl Harness {
    fn new(cpu: f64, culprit: &str, http_status: u16) -> Self {
        Self::build(cpu, culprit, http_status, RecordingNotifier::default())
    }

    fn build(cpu: f64, culprit: &str, http_status: u16, notifier: RecordingNotifier) -> Self {
        let host = Arc::new(FakeHost::new(cpu, culprit));
        let http = Arc::new(FakeHttp {
            status: http_status,
            calls: AtomicUsize::new(0),
        });
        let formatter = Arc::new(RecordingFormatter::default());
        let notifier = Arc::new(notifier);

        let collectors = Collectors {
            host: host.clone(),
            http: http.clone(),
            redis: None,
            mysql: None,
        };
        let monitor = Monitor::new(collectors, formatter.clone(), notifier.clone())
            .with_dump_wait(Duration::from_millis(200));

        Self {
            host,
            http,
            formatter,
            notifier,
            monitor: Arc::new(monitor),
        }
    }

    fn sends(&self) -> usize {
        self.notifier.sent.lock().len()
    }

    fn last_batch(&self) -> Vec<TriggeredAlert> {
        self.formatter.batches.lock().last().cloned().unwrap_or_default()
    }
}

fn config(extra: &str) -> Config {
    let yaml = format!(
        r#"
host_monitoring:
  enabled: true
  interval: 5s
  consecutive_threshold: 3
  alert_interval: 2m
  alert_title: "test-host alert"
  cpu_threshold: 80
  memory_threshold: 80
  disk_threshold: 90
app_monitoring:
  enabled: true
  http:
    enabled: true
    error_threshold: 0
    interval: 10s
    interfaces:
      - name: health
        url: "http://127.0.0.1:9/health"
        timeout: 1s
        need_alert: true
{extra}
"#
    );
    Config::from_yaml(&yaml).unwrap()
}

fn high_cpu_snapshot() -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::now();
    snapshot.cpu.percent = 92.5;
    snapshot
}

#[tokio::test]
async fn whitelisted_culprit_sends_nothing() {
    let h = Harness::new(92.5, "Java", 200);
    let cfg = config("white_process_list: [\"java\"]");

    h.monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    assert_eq!(h.sends(), 0);
    assert!(h.formatter.batches.lock().is_empty());
}

#[tokio::test]
async fn whitelist_drops_only_the_attributed_alert() {
    let h = Harness::new(92.5, "java", 200);
    let cfg = config("white_process_list: [\"JAVA\"]");

    h.monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh, AlertType::DiskHigh])
        .await
        .unwrap();

    assert_eq!(h.sends(), 1);
    let batch = h.last_batch();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].alert_type, AlertType::DiskHigh);
    assert_eq!(batch[0].message, AlertType::DiskHigh.description());
}

#[tokio::test]
async fn empty_alert_set_sends_nothing() {
    let h = Harness::new(92.5, "nginx", 200);

    h.monitor
        .notify_with_alert_types(&config(""), &high_cpu_snapshot(), &[])
        .await
        .unwrap();

    assert_eq!(h.sends(), 0);
}

#[tokio::test]
async fn culprit_is_named_in_message() {
    let h = Harness::new(92.5, "nginx", 200);

    h.monitor
        .notify_with_alert_types(&config(""), &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent, vec![("test-host alert".to_string(), "test-host alert: 1 alerts".to_string())]);
    assert_eq!(
        h.last_batch()[0].message,
        "CPU usage too high: 92.50% (culprit: nginx PID=7 95.50% CPU)"
    );
}

#[tokio::test]
async fn notifier_error_is_returned() {
    let h = Harness::build(
        92.5,
        "nginx",
        200,
        RecordingNotifier {
            fail: true,
            ..Default::default()
        },
    );

    let err = h
        .monitor
        .notify_with_alert_types(&config(""), &high_cpu_snapshot(), &[AlertType::DiskHigh])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Notify(_)));
    assert_eq!(h.sends(), 1);
}

#[tokio::test]
async fn finished_dump_script_adds_hint() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("dump.sh");
    std::fs::write(&script, "echo success\n").unwrap();

    let h = Harness::build(92.5, "nginx", 200, RecordingNotifier::default());
    let monitor = Monitor::new(
        Collectors {
            host: h.host.clone(),
            http: h.http.clone(),
            redis: None,
            mysql: None,
        },
        h.formatter.clone(),
        h.notifier.clone(),
    )
    .with_dump_wait(Duration::from_secs(5));
    let cfg = config(&format!("java_app_dump_script:\n  path: \"{}\"", script.display()));

    monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    let batch = h.last_batch();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].message.ends_with("\n\n> hint: Heap dump generated"));
}

#[tokio::test]
async fn erroring_dump_script_adds_no_hint() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("dump.sh");
    std::fs::write(&script, "echo 'jmap: pid 1234 not a java process' >&2\nexit 1\n").unwrap();

    let h = Harness::build(92.5, "nginx", 200, RecordingNotifier::default());
    let monitor = Monitor::new(
        Collectors {
            host: h.host.clone(),
            http: h.http.clone(),
            redis: None,
            mysql: None,
        },
        h.formatter.clone(),
        h.notifier.clone(),
    )
    .with_dump_wait(Duration::from_secs(5));
    let cfg = config(&format!("java_app_dump_script:\n  path: \"{}\"", script.display()));

    monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    let batch = h.last_batch();
    assert_eq!(batch.len(), 1);
    assert!(batch[0].message.contains("nginx"));
    assert!(!batch[0].message.contains("hint"));
}

#[tokio::test]
async fn slow_dump_script_adds_async_notice() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("dump.sh");
    std::fs::write(&script, "sleep 2\necho success\n").unwrap();

    let h = Harness::new(92.5, "nginx", 200);
    let cfg = config(&format!("java_app_dump_script:\n  path: \"{}\"", script.display()));

    h.monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    let batch = h.last_batch();
    assert_eq!(batch.len(), 2);
    assert!(!batch[0].message.contains("hint"));
    assert_eq!(batch[1].alert_type, AlertType::Info);
    assert_eq!(batch[1].message, ASYNC_DUMP_NOTICE);
}

#[tokio::test]
async fn base_breach_escalates_on_third_tick() {
    let h = Harness::new(95.0, "nginx", 200);
    let cfg = config("");
    let coordinator = Coordinator::new(h.monitor.clone());

    coordinator.prime(&cfg).await;
    assert_eq!(h.http.calls.load(Ordering::SeqCst), 1);

    coordinator.tick(Domain::Base, &cfg).await;
    coordinator.tick(Domain::Base, &cfg).await;
    assert_eq!(h.sends(), 0);
    assert_eq!(h.http.calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.policy(Domain::Base).consecutive_count(AlertType::CpuHigh), 2);

    coordinator.tick(Domain::Base, &cfg).await;
    assert_eq!(h.sends(), 1);
    assert_eq!(h.http.calls.load(Ordering::SeqCst), 2, "escalation re-probes HTTP");
    assert_eq!(h.last_batch()[0].alert_type, AlertType::CpuHigh);

    // Debounced within alert_interval.
    coordinator.tick(Domain::Base, &cfg).await;
    assert_eq!(h.sends(), 1);
}

#[tokio::test]
async fn http_breach_escalates_and_peeks_base() {
    let h = Harness::new(95.0, "nginx", 503);
    let cfg = config("");
    let coordinator = Coordinator::new(h.monitor.clone());
    coordinator.prime(&cfg).await;
    let host_calls = h.host.calls.load(Ordering::SeqCst);

    // The base policy has never seen CPU high, so its peek holds it back.
    for _ in 0..3 {
        coordinator.tick(Domain::Http, &cfg).await;
    }

    assert_eq!(h.sends(), 1);
    assert_eq!(h.host.calls.load(Ordering::SeqCst), host_calls + 1);
    let types: Vec<_> = h.last_batch().iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::HttpError]);

    // Peeking must not have advanced the base streak.
    assert_eq!(coordinator.policy(Domain::Base).consecutive_count(AlertType::CpuHigh), 0);
    assert_eq!(coordinator.merged().http.interfaces[0].status_code, 503);
}

#[tokio::test]
async fn escalation_attaches_other_domain_alerts() {
    let h = Harness::new(95.0, "nginx", 503);
    let cfg = config("");
    let coordinator = Coordinator::new(h.monitor.clone());
    coordinator.prime(&cfg).await;

    // Two HTTP ticks build the HTTP streak to 2 without firing.
    coordinator.tick(Domain::Http, &cfg).await;
    coordinator.tick(Domain::Http, &cfg).await;
    assert_eq!(h.sends(), 0);

    // Two base ticks build CPU to 2; the third escalates and the HTTP peek
    // (streak 2 + 1) attaches HttpError without committing it.
    coordinator.tick(Domain::Base, &cfg).await;
    coordinator.tick(Domain::Base, &cfg).await;
    coordinator.tick(Domain::Base, &cfg).await;

    assert_eq!(h.sends(), 1);
    let types: Vec<_> = h.last_batch().iter().map(|a| a.alert_type).collect();
    assert_eq!(types, vec![AlertType::CpuHigh, AlertType::HttpError]);
    assert_eq!(coordinator.policy(Domain::Http).consecutive_count(AlertType::HttpError), 2);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let h = Harness::new(10.0, "nginx", 200);
    let cfg = Config::from_yaml(
        r#"
host_monitoring:
  enabled: true
  interval: 20ms
app_monitoring:
  enabled: true
  http:
    enabled: true
    interval: 30ms
    interfaces:
      - name: health
        url: "http://127.0.0.1:9/health"
"#,
    )
    .unwrap();

    let coordinator = Arc::new(Coordinator::new(h.monitor.clone()));
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(coordinator.run(Arc::new(cfg), shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("coordinator did not stop")
        .unwrap();

    assert!(h.http.calls.load(Ordering::SeqCst) >= 2);
    assert!(h.host.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(h.sends(), 0);
}

#[tokio::test]
async fn dispatch_posts_markdown_to_dingtalk() {
    use gwatch::alerting::{DingTalkNotifier, HostIdentity, MarkdownFormatter};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/robot/send"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"errcode": 0, "errmsg": "ok"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&format!(
        "dingtalk:\n  webhook_url: \"{}/robot/send?access_token=t\"",
        server.uri()
    ));
    let formatter = MarkdownFormatter::with_identity(HostIdentity {
        hostname: "web-1".to_string(),
        ip: "10.0.0.8".to_string(),
    });
    let monitor = Monitor::new(
        Collectors {
            host: Arc::new(FakeHost::new(92.5, "nginx")),
            http: Arc::new(FakeHttp {
                status: 200,
                calls: AtomicUsize::new(0),
            }),
            redis: None,
            mysql: None,
        },
        Arc::new(formatter),
        Arc::new(DingTalkNotifier::new(&cfg.dingtalk).unwrap()),
    );

    monitor
        .notify_with_alert_types(&cfg, &high_cpu_snapshot(), &[AlertType::CpuHigh])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["msgtype"], "markdown");
    assert_eq!(body["markdown"]["title"], "test-host alert");

    let text = body["markdown"]["text"].as_str().unwrap();
    assert!(text.starts_with("## test-host alert"));
    assert!(text.contains("> CPU usage too high: 92.50% (culprit: nginx PID=7 95.50% CPU)"));
    assert!(text.contains("web-1 (10.0.0.8)"));
}
