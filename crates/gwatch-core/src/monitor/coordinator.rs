//! Dual-cadence scheduling
//!
//! The base loop (host, Redis, MySQL) and the HTTP loop run on their own
//! intervals and share the latest snapshot of each domain. Each loop is the
//! only caller of `apply` on its own policy; it may `peek` the other one.
//!
//! When a loop's preview shows its own policy would fire, it re-collects the
//! other domain first so the notification carries fresh readings for both,
//! then commits its own policy and attaches whatever the other policy would
//! fire, without committing it.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::alerting::{AlertPolicy, Domain};
use crate::config::Config;
use crate::error::Result;
use crate::models::{AlertType, MetricsSnapshot};

use super::runner::Monitor;

#[derive(Debug, Default)]
struct Latest {
    base: Option<MetricsSnapshot>,
    http: Option<MetricsSnapshot>,
}

/// Runs the base and HTTP loops until cancelled
pub struct Coordinator {
    monitor: Arc<Monitor>,
    policy_base: AlertPolicy,
    policy_http: AlertPolicy,
    latest: Mutex<Latest>,
}

impl Coordinator {
    /// Create a coordinator with fresh policy state
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            policy_base: AlertPolicy::new(Domain::Base),
            policy_http: AlertPolicy::new(Domain::Http),
            latest: Mutex::new(Latest::default()),
        }
    }

    /// Policy owned by `domain`
    pub fn policy(&self, domain: Domain) -> &AlertPolicy {
        match domain {
            Domain::Base => &self.policy_base,
            Domain::Http => &self.policy_http,
        }
    }

    /// Merge of the latest base and HTTP snapshots
    pub fn merged(&self) -> MetricsSnapshot {
        let latest = self.latest.lock();
        MetricsSnapshot::merge(latest.base.as_ref(), latest.http.as_ref())
    }

    /// Take cold snapshots of both domains
    pub async fn prime(&self, config: &Config) {
        let base = self.monitor.collect_base_once(config).await;
        let http = self.monitor.collect_http_once(config).await;
        let mut latest = self.latest.lock();
        latest.base = Some(base);
        latest.http = Some(http);
    }

    /// Prime, then run both loops until `shutdown` is cancelled
    ///
    /// Returns once both loops have observed the cancellation.
    pub async fn run(self: Arc<Self>, config: Arc<Config>, shutdown: CancellationToken) {
        self.prime(&config).await;
        info!(
            base_interval = %humantime::format_duration(config.base_interval()),
            http_interval = %humantime::format_duration(config.http_interval()),
            "Monitoring loops started"
        );

        let handles = [Domain::Base, Domain::Http].map(|domain| {
            let this = Arc::clone(&self);
            let config = Arc::clone(&config);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { this.run_loop(domain, &config, &shutdown).await })
        });

        for (domain, joined) in [Domain::Base, Domain::Http]
            .into_iter()
            .zip(futures::future::join_all(handles).await)
        {
            if let Err(e) = joined {
                error!(%domain, error = %e, "Monitoring loop aborted");
            }
        }
        info!("Monitoring loops stopped");
    }

    async fn run_loop(&self, domain: Domain, config: &Config, shutdown: &CancellationToken) {
        let period = match domain {
            Domain::Base => config.base_interval(),
            Domain::Http => config.http_interval(),
        };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!(%domain, "Loop received shutdown");
                    break;
                }
                _ = ticker.tick() => self.tick(domain, config).await,
            }
        }
    }

    /// One iteration of `domain`'s loop
    pub async fn tick(&self, domain: Domain, config: &Config) {
        let snapshot = self.collect(domain, config).await;
        let merged = self.store(domain, snapshot);

        let decisions = self.monitor.evaluate(config, &merged);
        let preview = self.policy(domain).peek(config, &domain.restrict(&decisions));

        let result = if preview.is_empty() {
            self.monitor.print_metrics(config, &merged);
            self.monitor
                .evaluate_and_notify(config, &merged, self.policy(domain))
                .await
        } else {
            self.escalate(domain, config).await
        };

        if let Err(e) = result {
            error!(%domain, error = %e, "Alert notification failed");
        }
    }

    async fn escalate(&self, domain: Domain, config: &Config) -> Result<()> {
        let other = domain.other();
        info!(%domain, refresh = %other, "Alert pending, refreshing other domain");

        let fresh = self.collect(other, config).await;
        let merged = self.store(other, fresh);

        let decisions = self.monitor.evaluate(config, &merged);
        let committed = self.policy(domain).apply(config, &domain.restrict(&decisions));
        let attached = self.policy(other).peek(config, &other.restrict(&decisions));

        let alert_types = union(committed, attached);
        self.monitor
            .notify_with_alert_types(config, &merged, &alert_types)
            .await
    }

    async fn collect(&self, domain: Domain, config: &Config) -> MetricsSnapshot {
        match domain {
            Domain::Base => self.monitor.collect_base_once(config).await,
            Domain::Http => self.monitor.collect_http_once(config).await,
        }
    }

    fn store(&self, domain: Domain, snapshot: MetricsSnapshot) -> MetricsSnapshot {
        let mut latest = self.latest.lock();
        match domain {
            Domain::Base => latest.base = Some(snapshot),
            Domain::Http => latest.http = Some(snapshot),
        }
        MetricsSnapshot::merge(latest.base.as_ref(), latest.http.as_ref())
    }
}

fn union(mut first: Vec<AlertType>, second: Vec<AlertType>) -> Vec<AlertType> {
    for alert_type in second {
        if !first.contains(&alert_type) {
            first.push(alert_type);
        }
    }
    first
}
