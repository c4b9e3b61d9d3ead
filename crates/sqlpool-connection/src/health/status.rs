//! Heartbeat verdicts

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool health according to the most recent heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// The probe answered, but slowly
    Degraded,
    /// The probe failed, or answered too slowly to trust the server
    Unhealthy,
}

/// Latency bands used to grade a successful heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    healthy: Duration,
    degraded: Duration,
}

impl HealthThresholds {
    /// `degraded` is raised to `healthy` if given lower, so the bands never
    /// overlap.
    pub fn new(healthy: Duration, degraded: Duration) -> Self {
        Self {
            healthy,
            degraded: degraded.max(healthy),
        }
    }

    /// Slowest answer still graded healthy
    pub fn healthy(&self) -> Duration {
        self.healthy
    }

    /// Slowest answer still graded degraded
    pub fn degraded(&self) -> Duration {
        self.degraded
    }

    /// Grade a probe that answered after `latency`. Band edges are inclusive.
    ///
    /// ```
    /// use sqlpool_connection::{HealthStatus, HealthThresholds};
    /// use std::time::Duration;
    ///
    /// let thresholds = HealthThresholds::default();
    /// assert_eq!(thresholds.classify(Duration::from_millis(100)), HealthStatus::Healthy);
    /// assert_eq!(thresholds.classify(Duration::from_millis(101)), HealthStatus::Degraded);
    /// ```
    pub fn classify(&self, latency: Duration) -> HealthStatus {
        if latency <= self.healthy {
            HealthStatus::Healthy
        } else if latency <= self.degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl Default for HealthThresholds {
    /// 100 ms healthy, 500 ms degraded
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}
