//! Error types for sqlpool

use std::time::Duration;

use thiserror::Error;

use crate::DriverError;

/// Name given to driver errors that carry no name of their own.
pub const DEFAULT_ERROR_NAME: &str = "MysqlError";

/// Error surfaced to pool callers and carried by pool `Error` events.
///
/// Errors are `Clone` so a single failure can be delivered both to the
/// originating caller and to every event subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Failure reported by the database client, normalized with the
    /// identity of the connection that produced it.
    #[error("{name}: {message}")]
    Query {
        name: String,
        message: String,
        fatal: bool,
    },

    /// The request waited in the queue longer than its deadline.
    #[error("QueueTimeout: {message}")]
    QueueTimeout { message: String },

    /// The query was dispatched but did not finish before its deadline.
    #[error("QueryTimeout: {message}")]
    QueryTimeout { message: String },

    /// A physical connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl PoolError {
    /// Normalize a driver error: keep its name unless it is missing or the
    /// generic `Error`, and suffix the message with the connection identity.
    pub fn from_driver(error: DriverError, identity: &str) -> Self {
        let name = match error.name {
            Some(name) if !name.is_empty() && name != "Error" => name,
            _ => DEFAULT_ERROR_NAME.to_string(),
        };
        PoolError::Query {
            name,
            message: format!("{} ({})", error.message, identity),
            fatal: error.fatal,
        }
    }

    /// Build the error handed to a request that expired in the wait queue.
    pub fn queue_timeout(limit: Duration, waited: Duration, pool: &str) -> Self {
        PoolError::QueueTimeout {
            message: format!(
                "Query stays in the queue more than {} ms ({}), waited {} ms",
                limit.as_millis(),
                pool,
                waited.as_millis()
            ),
        }
    }

    /// Build the error handed to a caller whose dispatched query overran.
    pub fn query_timeout(timeout: Duration, identity: &str) -> Self {
        PoolError::QueryTimeout {
            message: format!(
                "Mysql query timeout after {} ms ({})",
                timeout.as_millis(),
                identity
            ),
        }
    }

    /// Build the error reported when connecting to the server fails.
    pub fn connection(error: DriverError, identity: &str) -> Self {
        PoolError::Connection(format!("{} ({})", error.message, identity))
    }

    /// The error's name, as exposed to callers inspecting failures.
    pub fn name(&self) -> &str {
        match self {
            PoolError::Query { name, .. } => name,
            PoolError::QueueTimeout { .. } => "QueueTimeout",
            PoolError::QueryTimeout { .. } => "QueryTimeout",
            PoolError::Connection(_) => "ConnectionError",
            PoolError::PoolClosed => "PoolClosed",
            PoolError::Configuration(_) => "ConfigurationError",
            PoolError::Io(_) => "IoError",
        }
    }

    /// The error's message without the name prefix.
    pub fn message(&self) -> String {
        match self {
            PoolError::Query { message, .. }
            | PoolError::QueueTimeout { message }
            | PoolError::QueryTimeout { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the connection that produced this error is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::Query { fatal: true, .. })
    }

    /// Whether this is one of the two deadline errors.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PoolError::QueueTimeout { .. } | PoolError::QueryTimeout { .. }
        )
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err.to_string())
    }
}

/// Result type alias for sqlpool operations
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_driver_error_keeps_custom_name() {
        let err = PoolError::from_driver(
            DriverError::new("boom").with_name("TestError"),
            "root@localhost:3306",
        );
        assert_eq!(err.name(), "TestError");
        assert_eq!(err.message(), "boom (root@localhost:3306)");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_driver_error_generic_name_becomes_default() {
        let unnamed = PoolError::from_driver(DriverError::new("a"), "u@h:1");
        assert_eq!(unnamed.name(), DEFAULT_ERROR_NAME);

        let generic = PoolError::from_driver(DriverError::new("b").with_name("Error"), "u@h:1");
        assert_eq!(generic.name(), DEFAULT_ERROR_NAME);
    }

    #[test]
    fn test_fatal_flag_survives_normalization() {
        let err = PoolError::from_driver(
            DriverError::fatal("connection lost").with_name("TestFatal"),
            "u@h:1",
        );
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "TestFatal: connection lost (u@h:1)");
    }

    #[test]
    fn test_queue_timeout_names_limit() {
        let err = PoolError::queue_timeout(
            Duration::from_millis(10),
            Duration::from_millis(12),
            "test",
        );
        assert_eq!(err.name(), "QueueTimeout");
        assert_eq!(
            err.message(),
            "Query stays in the queue more than 10 ms (test), waited 12 ms"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_io_error_is_io() {
        let err = PoolError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "pool.toml missing",
        ));
        assert_eq!(err, PoolError::Io("pool.toml missing".to_string()));
        assert_eq!(err.name(), "IoError");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_query_timeout_names_limit() {
        let err = PoolError::query_timeout(Duration::from_millis(15), "u@h:1");
        assert_eq!(err.name(), "QueryTimeout");
        assert_eq!(err.message(), "Mysql query timeout after 15 ms (u@h:1)");
    }
}
