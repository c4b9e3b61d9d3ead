//! Pool-level events
//!
//! Events are fanned out over a `tokio::sync::broadcast` channel. Nobody
//! listening is a normal state, so send failures are ignored.

use sqlpool_core::PoolError;
use tokio::sync::broadcast;

use crate::health::HeartbeatReport;

/// Why a connection left the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Sat unused for longer than the idle threshold
    IdleTimeout,
    /// The client reported an unrecoverable error
    Fatal,
    /// The pool is shutting down
    Shutdown,
}

/// Something observable happened inside the pool
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A heartbeat probe succeeded
    State(HeartbeatReport),
    /// A heartbeat failed or a connection hit a fatal error
    Error(PoolError),
    /// A dispatched query overran its deadline
    Timeout { index: usize, sql: String },
    /// A physical connection was established
    ConnectionOpened { index: usize },
    /// A physical connection was removed from rotation
    ConnectionClosed { index: usize, reason: CloseReason },
}

impl PoolEvent {
    /// Short event name, matching the names listeners subscribe by
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::State(_) => "state",
            PoolEvent::Error(_) => "error",
            PoolEvent::Timeout { .. } => "timeout",
            PoolEvent::ConnectionOpened { .. } => "open",
            PoolEvent::ConnectionClosed { .. } => "close",
        }
    }
}

/// Cloneable emitter shared by the manager and connection tasks
#[derive(Debug, Clone)]
pub(crate) struct EventSender {
    tx: broadcast::Sender<PoolEvent>,
}

impl EventSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }
}
