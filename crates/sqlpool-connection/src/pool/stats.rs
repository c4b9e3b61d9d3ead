//! Pool statistics types

use serde::{Deserialize, Serialize};

use crate::health::HealthStatus;

/// Snapshot of a pool's state
///
/// The free list is diagnostic: it shows the reuse order the pool will
/// follow, not a stable contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub(super) created: usize,
    pub(super) busy: usize,
    pub(super) idle: usize,
    pub(super) waiting: usize,
    pub(super) free_list: Vec<usize>,
    pub(super) health: HealthStatus,
    pub(super) consecutive_heartbeat_failures: u32,
}

impl PoolStats {
    /// Connections currently open or opening
    pub fn created(&self) -> usize {
        self.created
    }

    /// Connections running a query, or connecting to run one
    pub fn busy(&self) -> usize {
        self.busy
    }

    /// Connections on the free list
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Requests queued for a connection
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Idle connection indices, most recently released last
    pub fn free_list(&self) -> &[usize] {
        &self.free_list
    }

    /// Verdict of the latest heartbeat
    pub fn health(&self) -> HealthStatus {
        self.health
    }

    pub fn consecutive_heartbeat_failures(&self) -> u32 {
        self.consecutive_heartbeat_failures
    }

    /// Share of open connections in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.created == 0 {
            0.0
        } else {
            self.busy as f64 / self.created as f64
        }
    }
}
