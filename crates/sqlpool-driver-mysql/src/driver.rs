//! MySQL driver

use async_trait::async_trait;
use mysql_async::{Conn, Opts, OptsBuilder};
use sqlpool_core::{ConnectOptions, DEFAULT_PORT, Driver, DriverResult, RawConnection};

use crate::connection::{MySqlConnection, map_error};

/// Opens one `mysql_async` connection per pooled connection.
///
/// `mysql_async` spawns onto the ambient tokio runtime, so the driver must
/// be used from inside one, which the pool already requires.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, options), fields(host = %options.host, port = options.port, user = %options.user))]
    async fn connect(&self, options: &ConnectOptions) -> DriverResult<Box<dyn RawConnection>> {
        tracing::debug!("connecting to MySQL server");
        let conn = Conn::new(build_opts(options)).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect");
            map_error(e)
        })?;
        tracing::debug!(connection_id = conn.id(), "MySQL connection established");
        Ok(Box::new(MySqlConnection::new(conn)))
    }
}

/// Translate pool connect options into `mysql_async` options
pub(crate) fn build_opts(options: &ConnectOptions) -> Opts {
    let port = if options.port > 0 {
        options.port
    } else {
        DEFAULT_PORT
    };

    OptsBuilder::default()
        .ip_or_hostname(options.host.clone())
        .tcp_port(port)
        .user(Some(options.user.clone()))
        .pass(options.password.clone())
        .db_name(options.database.clone())
        .into()
}
