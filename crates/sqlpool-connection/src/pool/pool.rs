//! Pool handle

use std::sync::Arc;
use std::time::Duration;

use sqlpool_core::{Driver, PoolError, QueryResult, Result, Statement};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::config::PoolConfig;
use super::manager::{Command, Job, PoolManager};
use super::stats::PoolStats;
use crate::events::{EventSender, PoolEvent};

struct PoolInner {
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    events: EventSender,
}

/// A bounded pool of database connections
///
/// `Pool` is a cheap handle; clones share the same connections. The pool
/// shuts itself down once the last handle is dropped.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Start a pool. Connections are opened lazily, on demand.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: PoolConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::Configuration(format!("no tokio runtime: {}", e)))?;

        let events = EventSender::new(config.event_capacity());
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (signals, signal_rx) = mpsc::unbounded_channel();

        let manager = PoolManager::new(&config, driver, events.clone(), signals);
        runtime.spawn(manager.run(command_rx, signal_rx));

        tracing::info!(
            pool = config.name(),
            max_connections = config.max_connections(),
            identity = %config.connection().identity(),
            "pool started"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                name: config.name().to_string(),
                commands,
                events,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run a statement on a pooled connection.
    ///
    /// `timeout` bounds both the wait for a free connection and the query
    /// itself; `None` or zero waits indefinitely. Dropping the returned
    /// future abandons a request that is still queued.
    #[tracing::instrument(skip(self, statement), fields(pool = %self.inner.name))]
    pub async fn query(
        &self,
        statement: impl Into<Statement>,
        timeout: Option<Duration>,
    ) -> Result<QueryResult> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Query(Job {
            statement: statement.into(),
            timeout: timeout.filter(|t| !t.is_zero()),
            reply,
        }))?;
        answer.await.map_err(|_| PoolError::PoolClosed)?
    }

    /// Replace the heartbeat statement; the next tick uses it
    pub fn set_heartbeat_query(&self, sql: impl Into<String>) -> Result<()> {
        self.send(Command::SetHeartbeatQuery(sql.into()))
    }

    /// Receive pool events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Stats(reply))?;
        answer.await.map_err(|_| PoolError::PoolClosed)
    }

    /// Fail queued requests, close every connection and stop the pool.
    ///
    /// Busy connections are closed as their queries finish; this resolves
    /// once the last one is closed. Shutting down a stopped pool is a no-op.
    #[tracing::instrument(skip(self), fields(pool = %self.inner.name))]
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        if self.send(Command::Shutdown(reply)).is_err() {
            return Ok(());
        }
        done.await.map_err(|_| PoolError::PoolClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| PoolError::PoolClosed)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("name", &self.inner.name).finish()
    }
}
