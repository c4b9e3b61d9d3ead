//! Bounded connection pooling
//!
//! Requests are served from the most recently released idle connection,
//! or from a new connection while the pool is under capacity. Anything
//! beyond that waits in a FIFO queue, optionally with a deadline.
//!
//! # Example
//!
//! ```ignore
//! use sqlpool_connection::{Pool, PoolConfig};
//! use sqlpool_driver_mysql::MySqlDriver;
//!
//! let config = PoolConfig::new(4)
//!     .with_max_idle_time_ms(30_000)
//!     .with_heartbeat_interval_ms(5_000);
//!
//! let pool = Pool::new(config, Arc::new(MySqlDriver::new()))?;
//! let result = pool.query("SELECT 1", Some(Duration::from_secs(2))).await?;
//! ```

mod config;
mod free_list;
mod manager;
mod pool;
mod stats;
mod wait_queue;


pub use config::{
    ENV_HEARTBEAT_INTERVAL_MS, ENV_HEARTBEAT_QUERY, ENV_MAX_CONNECTIONS, ENV_MAX_IDLE_TIME_MS,
    PoolConfig,
};
pub use pool::Pool;
pub use stats::PoolStats;
