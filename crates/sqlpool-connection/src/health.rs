//! Pool health monitoring
//!
//! The heartbeat probes the database on a fixed interval through the pool's
//! own admission path and classifies each answer by latency.
//!
//! # Example
//!
//! ```
//! use sqlpool_connection::{HealthStatus, HealthTracker};
//! use sqlpool_core::QueryResult;
//! use std::time::Duration;
//!
//! let mut tracker = HealthTracker::default();
//! let report = tracker.record_success(QueryResult::empty(), Duration::from_millis(20));
//! assert_eq!(report.status, HealthStatus::Healthy);
//!
//! tracker.record_failure();
//! assert_eq!(tracker.last_status(), HealthStatus::Unhealthy);
//! ```

mod heartbeat;
mod status;


pub(crate) use heartbeat::HeartbeatMonitor;
pub use heartbeat::{DEFAULT_HEARTBEAT_QUERY, HealthTracker, HeartbeatReport};
pub use status::{HealthStatus, HealthThresholds};
