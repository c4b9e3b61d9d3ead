//! Pooled connection wrapper
//!
//! Wraps one [`RawConnection`] with the behavior every pooled connection
//! shares: statement rendering, error normalization, per-query deadlines,
//! fatal-error detection and idempotent closing.

use std::sync::Arc;
use std::time::Duration;

use sqlpool_core::{
    ConnectOptions, Driver, DriverError, DriverResult, PoolError, QueryResult, RawConnection,
    Result, Statement,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::events::{EventSender, PoolEvent};

/// Lifecycle of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Open,
    /// A fatal error was seen; the connection must not be reused
    Closing,
    Closed,
}

/// One physical connection owned by the pool
pub(crate) struct Connection {
    index: usize,
    id: u64,
    identity: Arc<str>,
    raw: Box<dyn RawConnection>,
    state: ConnectionState,
    created_at: Instant,
    watcher: Option<JoinHandle<()>>,
}

impl Connection {
    /// Open a physical connection for slot `index`.
    ///
    /// Errors the client reports outside of any query are passed to
    /// `on_error` until it returns false or the connection is closed.
    pub(crate) async fn open<F>(
        driver: Arc<dyn Driver>,
        options: &ConnectOptions,
        index: usize,
        id: u64,
        identity: Arc<str>,
        on_error: F,
    ) -> Result<Self>
    where
        F: Fn(DriverError) -> bool + Send + 'static,
    {
        let mut raw = driver
            .connect(options)
            .await
            .map_err(|err| PoolError::connection(err, &identity))?;

        let watcher = raw.take_error_events().map(|mut errors| {
            tokio::spawn(async move {
                while let Some(err) = errors.recv().await {
                    if !on_error(err) {
                        break;
                    }
                }
            })
        });

        tracing::debug!(index, identity = %identity, driver = driver.name(), "connection opened");

        Ok(Self {
            index,
            id,
            identity,
            raw,
            state: ConnectionState::Open,
            created_at: Instant::now(),
            watcher,
        })
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Serial number, unique for the lifetime of the pool
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Run one statement and deliver its outcome through `reply`.
    ///
    /// With a deadline, an overrun answers the caller with `QueryTimeout` and
    /// emits a `Timeout` event at once, but this call still waits for the
    /// underlying query so the connection is never handed out while busy.
    /// The late answer is dropped.
    pub(crate) async fn query(
        &mut self,
        statement: &Statement,
        timeout: Option<Duration>,
        reply: oneshot::Sender<Result<QueryResult>>,
        events: &EventSender,
    ) {
        let sql = statement.render();

        let (outcome, reply) = match timeout {
            Some(limit) => {
                let mut call = self.raw.query(&sql);
                tokio::select! {
                    biased;
                    outcome = &mut call => (outcome, Some(reply)),
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(
                            index = self.index,
                            timeout_ms = limit.as_millis() as u64,
                            sql = %sql,
                            "query timed out"
                        );
                        let _ = reply.send(Err(PoolError::query_timeout(limit, &self.identity)));
                        events.emit(PoolEvent::Timeout {
                            index: self.index,
                            sql: sql.clone(),
                        });
                        (call.await, None)
                    }
                }
            }
            None => (self.raw.query(&sql).await, Some(reply)),
        };

        let outcome = self.settle(outcome, events);
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    /// Normalize a driver outcome. A fatal error on an open connection
    /// starts closing it and is reported pool-wide.
    fn settle(
        &mut self,
        outcome: DriverResult<QueryResult>,
        events: &EventSender,
    ) -> Result<QueryResult> {
        outcome.map_err(|err| {
            let err = PoolError::from_driver(err, &self.identity);
            if err.is_fatal() && self.state == ConnectionState::Open {
                tracing::error!(index = self.index, error = %err, "fatal connection error");
                self.state = ConnectionState::Closing;
                events.emit(PoolEvent::Error(err.clone()));
            }
            err
        })
    }

    /// End the physical connection. Calling this on a closed connection
    /// does nothing.
    pub(crate) async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        if let Err(e) = self.raw.end().await {
            tracing::debug!(index = self.index, error = %e, "error while ending connection");
        }
        tracing::debug!(
            index = self.index,
            age_ms = self.age().as_millis() as u64,
            "connection closed"
        );
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state)
            .finish()
    }
}
