//! sqlpool connection - bounded database connection pooling
//!
//! This crate owns the pool itself: the connection wrapper, the LIFO free
//! list, the FIFO wait queue, idle reaping and the heartbeat monitor, all
//! driven by a single manager task.

mod connection;
mod events;
pub mod health;
pub mod pool;
mod timer;

#[cfg(test)]
mod testing;

pub use events::{CloseReason, PoolEvent};
pub use health::{
    DEFAULT_HEARTBEAT_QUERY, HealthStatus, HealthThresholds, HealthTracker, HeartbeatReport,
};
pub use pool::{Pool, PoolConfig, PoolStats};
pub use sqlpool_core::{
    ConnectOptions, Driver, DriverError, PoolError, QueryResult, RawConnection, Result, Row,
    Statement, Value,
};
