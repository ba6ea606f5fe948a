//! Debounce and consecutive-count policy
//!
//! [`AlertPolicy`] turns evaluator decisions into the alert types that should
//! actually be notified. Consecutive-required types must hold for
//! `consecutive_threshold` back-to-back ticks, and every type is debounced by
//! its interval after it fires.
//!
//! [`AlertPolicy::apply`] commits state. [`AlertPolicy::peek`] runs the same
//! algorithm against a copy and never writes back, so any number of peeks
//! leaves the next `apply` unchanged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_ALERT_INTERVAL, DEFAULT_CONSECUTIVE_THRESHOLD};
use crate::models::{AlertType, Decision};

use super::evaluator::Domain;

/// Per-type policy state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TypeState {
    consecutive: u32,
    last_fired: Option<Instant>,
}

type PolicyState = HashMap<AlertType, TypeState>;

/// Stateful debounce / consecutive-count filter for one collection domain
#[derive(Debug)]
pub struct AlertPolicy {
    domain: Domain,
    state: RwLock<PolicyState>,
}

impl AlertPolicy {
    /// Create a policy with empty state
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Domain this policy is labelled with
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Filter `decisions`, committing counters and fire times
    pub fn apply(&self, config: &Config, decisions: &[Decision]) -> Vec<AlertType> {
        self.apply_at(config, decisions, Instant::now())
    }

    /// [`apply`](Self::apply) at an explicit instant
    pub fn apply_at(&self, config: &Config, decisions: &[Decision], now: Instant) -> Vec<AlertType> {
        let mut state = self.state.write();
        run(self.domain, &mut state, config, decisions, now, true)
    }

    /// Forecast what [`apply`](Self::apply) would return without changing state
    pub fn peek(&self, config: &Config, decisions: &[Decision]) -> Vec<AlertType> {
        self.peek_at(config, decisions, Instant::now())
    }

    /// [`peek`](Self::peek) at an explicit instant
    pub fn peek_at(&self, config: &Config, decisions: &[Decision], now: Instant) -> Vec<AlertType> {
        let mut copy = self.state.read().clone();
        run(self.domain, &mut copy, config, decisions, now, false)
    }

    /// Current streak length of `alert_type`
    pub fn consecutive_count(&self, alert_type: AlertType) -> u32 {
        self.state
            .read()
            .get(&alert_type)
            .map_or(0, |s| s.consecutive)
    }
}

fn debounce_interval(config: &Config, alert_type: AlertType) -> Duration {
    if alert_type == AlertType::HttpError {
        if let Some(http) = config.http_section() {
            return http.interval;
        }
    }
    config
        .host_monitoring
        .as_ref()
        .map_or(DEFAULT_ALERT_INTERVAL, |h| h.alert_interval)
}

fn consecutive_threshold(config: &Config) -> u32 {
    config
        .host_monitoring
        .as_ref()
        .map_or(DEFAULT_CONSECUTIVE_THRESHOLD, |h| h.consecutive_threshold)
}

fn run(
    domain: Domain,
    state: &mut PolicyState,
    config: &Config,
    decisions: &[Decision],
    now: Instant,
    commit: bool,
) -> Vec<AlertType> {
    // A tick without the decision breaks the streak.
    for t in AlertType::consecutive_types() {
        if !decisions.iter().any(|d| d.alert_type == t) {
            state.entry(t).or_default().consecutive = 0;
        }
    }

    let threshold = consecutive_threshold(config);
    let mut fired = Vec::new();

    for decision in decisions {
        let t = decision.alert_type;
        let entry = state.entry(t).or_default();

        if t.requires_consecutive() {
            entry.consecutive = entry.consecutive.saturating_add(1);
        } else {
            entry.consecutive = 1;
        }

        let interval = debounce_interval(config, t);
        if let Some(last) = entry.last_fired {
            if now.saturating_duration_since(last) < interval {
                if commit {
                    debug!(%domain, alert = t.code(), ?interval, "Debounced");
                }
                continue;
            }
        }

        if t.requires_consecutive() && entry.consecutive < threshold {
            if commit {
                info!(
                    %domain,
                    alert = t.code(),
                    count = entry.consecutive,
                    threshold,
                    "{}/{} consecutive breaches, holding",
                    entry.consecutive,
                    threshold
                );
            }
            continue;
        }

        if commit {
            entry.last_fired = Some(now);
            warn!(%domain, alert = t.code(), count = entry.consecutive, "Alert fired");
        }
        fired.push(t);
    }

    fired
}
