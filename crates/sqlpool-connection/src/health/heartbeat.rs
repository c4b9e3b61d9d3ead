//! Periodic heartbeat probing
//!
//! A ticker task nudges the pool manager once per interval. The manager runs
//! the probe through normal admission and hands the outcome back here to be
//! classified.

use std::time::Duration;

use sqlpool_core::{QueryResult, Result};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::status::{HealthStatus, HealthThresholds};

/// Statement probed when none is configured
pub const DEFAULT_HEARTBEAT_QUERY: &str = r#"SHOW VARIABLES LIKE "READ_ONLY""#;

/// Outcome of a successful heartbeat, carried by `PoolEvent::State`
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatReport {
    /// Rows returned by the heartbeat statement
    pub result: QueryResult,
    /// Time from issuing the probe to receiving its answer, queueing included
    pub latency: Duration,
    /// Status classified from `latency`
    pub status: HealthStatus,
}

/// Running health verdict built from consecutive heartbeats
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    thresholds: HealthThresholds,
    consecutive_failures: u32,
    last_status: HealthStatus,
}

impl HealthTracker {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            thresholds,
            consecutive_failures: 0,
            last_status: HealthStatus::Healthy,
        }
    }

    /// Record a successful probe and build its report
    pub fn record_success(&mut self, result: QueryResult, latency: Duration) -> HeartbeatReport {
        let status = self.thresholds.classify(latency);
        self.consecutive_failures = 0;
        self.last_status = status;
        HeartbeatReport {
            result,
            latency,
            status,
        }
    }

    /// Record a failed probe, returning the failure streak
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.last_status = HealthStatus::Unhealthy;
        self.consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_status(&self) -> HealthStatus {
        self.last_status
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }
}

/// Heartbeat state owned by the pool manager
#[derive(Debug)]
pub(crate) struct HeartbeatMonitor {
    query: String,
    interval: Option<Duration>,
    in_flight: Option<Instant>,
    tracker: HealthTracker,
    ticker: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    /// `interval` of `None` leaves the monitor permanently idle
    pub(crate) fn new(query: impl Into<String>, interval: Option<Duration>) -> Self {
        Self {
            query: query.into(),
            interval,
            in_flight: None,
            tracker: HealthTracker::default(),
            ticker: None,
        }
    }

    /// Start the ticker. `on_tick` runs once per interval until it returns
    /// false or the monitor is stopped.
    pub(crate) fn start<F>(&mut self, mut on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let Some(period) = self.interval else {
            return;
        };
        self.stop();
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !on_tick() {
                    break;
                }
            }
        }));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    pub(crate) fn set_query(&mut self, sql: impl Into<String>) {
        self.query = sql.into();
    }

    pub(crate) fn query(&self) -> &str {
        &self.query
    }

    pub(crate) fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Mark a probe as outstanding. Returns false if one already is.
    pub(crate) fn begin(&mut self) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        self.in_flight = Some(Instant::now());
        true
    }

    /// Settle the outstanding probe
    pub(crate) fn finish(&mut self, outcome: Result<QueryResult>) -> Result<HeartbeatReport> {
        let latency = self
            .in_flight
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        match outcome {
            Ok(result) => Ok(self.tracker.record_success(result, latency)),
            Err(err) => {
                self.tracker.record_failure();
                Err(err)
            }
        }
    }

    pub(crate) fn tracker(&self) -> &HealthTracker {
        &self.tracker
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
