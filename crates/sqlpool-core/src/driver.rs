//! Database client contracts
//!
//! The pool never speaks a wire protocol itself. It opens connections
//! through a [`Driver`] and runs one statement at a time on each
//! [`RawConnection`] it gets back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::QueryResult;

/// Default MySQL server port
pub const DEFAULT_PORT: u16 = 3306;

/// Error reported by a database client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    /// Error name, e.g. the server error code symbol
    pub name: Option<String>,
    /// Human readable description
    pub message: String,
    /// The connection is unusable after this error
    pub fatal: bool,
}

impl DriverError {
    /// Create a non-fatal error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
            fatal: false,
        }
    }

    /// Create an error that leaves the connection unusable
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            name: None,
            message: message.into(),
            fatal: true,
        }
    }

    /// Attach an error name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Result type for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Options used to open a physical connection
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// `user@host:port`, appended to every error a connection reports
    pub fn identity(&self) -> String {
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        format!("{}@{}:{}", self.user, self.host, port)
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: None,
            database: None,
        }
    }
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .finish()
    }
}

/// A database client able to open physical connections
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Driver name used in logs (e.g. "mysql")
    fn name(&self) -> &str;

    /// Open a new physical connection
    async fn connect(&self, options: &ConnectOptions) -> DriverResult<Box<dyn RawConnection>>;
}

/// One physical connection to the database server
///
/// The pool guarantees at most one call in flight per connection.
#[async_trait]
pub trait RawConnection: Send + 'static {
    /// Run a single fully rendered statement
    async fn query(&mut self, sql: &str) -> DriverResult<QueryResult>;

    /// Gracefully end the connection
    async fn end(&mut self) -> DriverResult<()>;

    /// Hand over the stream of errors the client reports outside of any
    /// query, such as the server dropping the socket while idle.
    ///
    /// Called once, right after the connection is opened.
    fn take_error_events(&mut self) -> Option<mpsc::UnboundedReceiver<DriverError>> {
        None
    }
}
