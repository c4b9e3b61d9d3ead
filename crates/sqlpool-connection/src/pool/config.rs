//! Pool configuration types

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlpool_core::{ConnectOptions, PoolError, Result};

use crate::health::DEFAULT_HEARTBEAT_QUERY;

/// Environment variables read by [`PoolConfig::with_env_overrides`]
pub const ENV_MAX_CONNECTIONS: &str = "SQLPOOL_MAX_CONNECTIONS";
pub const ENV_MAX_IDLE_TIME_MS: &str = "SQLPOOL_MAX_IDLE_TIME_MS";
pub const ENV_HEARTBEAT_INTERVAL_MS: &str = "SQLPOOL_HEARTBEAT_INTERVAL_MS";
pub const ENV_HEARTBEAT_QUERY: &str = "SQLPOOL_HEARTBEAT_QUERY";

/// Configuration for a connection pool
///
/// Controls capacity, idle reaping and the heartbeat. Deserializes from
/// TOML or JSON; the short option names `maxconnections`, `maxidletime` and
/// `heartbeatInterval` are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Name used in logs and pool-level error messages
    name: String,
    /// Maximum number of physical connections
    #[serde(alias = "maxconnections")]
    max_connections: usize,
    /// Idle time in milliseconds after which a free connection is closed
    #[serde(alias = "maxidletime")]
    max_idle_time_ms: Option<u64>,
    /// Heartbeat period in milliseconds, 0 disables the heartbeat
    #[serde(alias = "heartbeatInterval")]
    heartbeat_interval_ms: u64,
    /// Statement the heartbeat runs
    heartbeat_query: String,
    /// Buffered events per subscriber before slow subscribers lag
    event_capacity: usize,
    /// Passed to the driver for every new connection
    connection: ConnectOptions,
}

impl PoolConfig {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| PoolError::Configuration(e.to_string()))
    }

    /// Read a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(path = ?path, "loaded pool configuration");
        Self::from_toml_str(&source)
    }

    /// Apply `SQLPOOL_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by environment variable name
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = parse_number(ENV_MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_IDLE_TIME_MS) {
            self.max_idle_time_ms = Some(parse_number(ENV_MAX_IDLE_TIME_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_HEARTBEAT_INTERVAL_MS) {
            self.heartbeat_interval_ms = parse_number(ENV_HEARTBEAT_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_HEARTBEAT_QUERY) {
            self.heartbeat_query = value;
        }
        Ok(self)
    }

    /// Reject configurations the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_interval_ms > 0 && self.heartbeat_query.trim().is_empty() {
            return Err(PoolError::Configuration(
                "heartbeat_query must not be empty while the heartbeat is enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Close connections left idle for this long. 0 disables reaping.
    pub fn with_max_idle_time_ms(mut self, idle_ms: u64) -> Self {
        self.max_idle_time_ms = Some(idle_ms);
        self
    }

    /// Probe every `interval_ms`. 0 disables the heartbeat.
    pub fn with_heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    pub fn with_heartbeat_query(mut self, sql: impl Into<String>) -> Self {
        self.heartbeat_query = sql.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_connection(mut self, connection: ConnectOptions) -> Self {
        self.connection = connection;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Idle reaping threshold, if enabled
    pub fn max_idle_time(&self) -> Option<Duration> {
        self.max_idle_time_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Heartbeat period, if enabled
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn heartbeat_query(&self) -> &str {
        &self.heartbeat_query
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    pub fn connection(&self) -> &ConnectOptions {
        &self.connection
    }
}

impl Default for PoolConfig {
    /// Defaults:
    /// - max_connections: 10
    /// - max_idle_time: disabled
    /// - heartbeat: every second with `SHOW VARIABLES LIKE "READ_ONLY"`
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            max_connections: 10,
            max_idle_time_ms: None,
            heartbeat_interval_ms: 1000,
            heartbeat_query: DEFAULT_HEARTBEAT_QUERY.to_string(),
            event_capacity: 256,
            connection: ConnectOptions::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PoolError::Configuration(format!("{} must be a number, got {:?}", key, value)))
}
