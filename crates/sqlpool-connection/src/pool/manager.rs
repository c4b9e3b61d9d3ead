//! Pool manager actor
//!
//! A single task owns every piece of pool state: the connection slots, the
//! free list, the wait queue and the heartbeat. Handles talk to it through
//! [`Command`]s; connection tasks and timers report back through
//! [`Signal`]s. Handlers never await, so each message is applied to the
//! state in one step and no locking is needed.

use std::sync::Arc;
use std::time::Duration;

use sqlpool_core::{
    ConnectOptions, Driver, DriverError, PoolError, QueryResult, Result, Statement,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use super::config::PoolConfig;
use super::free_list::FreeList;
use super::stats::PoolStats;
use super::wait_queue::WaitQueue;
use crate::connection::Connection;
use crate::events::{CloseReason, EventSender, PoolEvent};
use crate::health::HeartbeatMonitor;
use crate::timer::TimerHandle;

/// A query waiting to run, together with where its answer goes
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) statement: Statement,
    pub(crate) timeout: Option<Duration>,
    pub(crate) reply: oneshot::Sender<Result<QueryResult>>,
}

/// Requests from pool handles
#[derive(Debug)]
pub(crate) enum Command {
    Query(Job),
    SetHeartbeatQuery(String),
    Stats(oneshot::Sender<PoolStats>),
    Shutdown(oneshot::Sender<()>),
}

/// Reports from connection tasks and timers
#[derive(Debug)]
pub(crate) enum Signal {
    /// A connection finished its query and is handed back
    Released { index: usize, conn: Connection },
    /// Opening a connection for `index` failed
    ConnectFailed { index: usize },
    /// A queued request's deadline passed
    QueueExpired { ticket: u64 },
    /// An idle connection's reap timer fired
    IdleExpired { index: usize, id: u64 },
    /// The client reported an error outside of any query
    DriverError { index: usize, id: u64, error: DriverError },
    HeartbeatTick,
    HeartbeatDone { outcome: Result<QueryResult> },
}

/// Occupancy of one connection index
#[derive(Debug)]
enum Slot {
    Vacant,
    Idle {
        conn: Connection,
        idle_timer: Option<TimerHandle>,
    },
    /// Checked out to a task, or still connecting. A doomed connection is
    /// closed instead of reused when it comes back.
    Busy { id: u64, doomed: bool },
}

impl Slot {
    fn is_vacant(&self) -> bool {
        matches!(self, Slot::Vacant)
    }
}

pub(crate) struct PoolManager {
    name: Arc<str>,
    driver: Arc<dyn Driver>,
    options: Arc<ConnectOptions>,
    identity: Arc<str>,
    max_idle_time: Option<Duration>,
    /// Slot for connection index `i` lives at `slots[i - 1]`
    slots: Vec<Slot>,
    free: FreeList,
    queue: WaitQueue<Job>,
    heartbeat: HeartbeatMonitor,
    events: EventSender,
    signals: mpsc::UnboundedSender<Signal>,
    next_id: u64,
    closers: JoinSet<()>,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl PoolManager {
    pub(crate) fn new(
        config: &PoolConfig,
        driver: Arc<dyn Driver>,
        events: EventSender,
        signals: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        let capacity = config.max_connections();
        Self {
            name: Arc::from(config.name()),
            driver,
            identity: Arc::from(config.connection().identity()),
            options: Arc::new(config.connection().clone()),
            max_idle_time: config.max_idle_time(),
            slots: (0..capacity).map(|_| Slot::Vacant).collect(),
            free: FreeList::new(),
            queue: WaitQueue::new(),
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_query(),
                config.heartbeat_interval(),
            ),
            events,
            signals,
            next_id: 1,
            closers: JoinSet::new(),
            shutting_down: false,
            shutdown_waiters: Vec::new(),
        }
    }

    /// Drive the pool until it is shut down and every connection is closed.
    ///
    /// Signals are drained before commands so a released connection is back
    /// on the free list before the next request is admitted.
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        let ticks = self.signals.clone();
        self.heartbeat.start(move || ticks.send(Signal::HeartbeatTick).is_ok());

        let mut commands_open = true;
        loop {
            if self.shutting_down && self.slots.iter().all(Slot::is_vacant) {
                break;
            }
            tokio::select! {
                biased;
                Some(signal) = signals.recv() => self.handle_signal(signal),
                Some(_) = self.closers.join_next(), if !self.closers.is_empty() => {}
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::debug!(pool = %self.name, "all pool handles dropped");
                        commands_open = false;
                        self.begin_shutdown();
                    }
                },
            }
        }

        while self.closers.join_next().await.is_some() {}
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!(pool = %self.name, "pool shut down");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Query(job) => self.admit(job),
            Command::SetHeartbeatQuery(sql) => {
                tracing::debug!(pool = %self.name, sql = %sql, "heartbeat query replaced");
                self.heartbeat.set_query(sql);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown(reply) => {
                self.shutdown_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Released { index, conn } => self.release(index, conn),
            Signal::ConnectFailed { index } => {
                self.slots[index - 1] = Slot::Vacant;
                self.refill(index);
            }
            Signal::QueueExpired { ticket } => self.expire_waiter(ticket),
            Signal::IdleExpired { index, id } => self.reap(index, id),
            Signal::DriverError { index, id, error } => self.driver_error(index, id, error),
            Signal::HeartbeatTick => self.heartbeat_tick(),
            Signal::HeartbeatDone { outcome } => match self.heartbeat.finish(outcome) {
                Ok(report) => {
                    tracing::debug!(
                        pool = %self.name,
                        latency_ms = report.latency.as_millis() as u64,
                        status = ?report.status,
                        "heartbeat ok"
                    );
                    self.events.emit(PoolEvent::State(report));
                }
                Err(err) => {
                    tracing::warn!(
                        pool = %self.name,
                        failures = self.heartbeat.tracker().consecutive_failures(),
                        error = %err,
                        "heartbeat failed"
                    );
                    self.events.emit(PoolEvent::Error(err));
                }
            },
        }
    }

    /// Route a new request: reuse the most recently freed connection, else
    /// open one if under capacity, else queue it.
    fn admit(&mut self, job: Job) {
        if self.shutting_down {
            let _ = job.reply.send(Err(PoolError::PoolClosed));
            return;
        }
        if job.reply.is_closed() {
            return;
        }

        while let Some(index) = self.free.pop() {
            if let Some(conn) = self.checkout(index) {
                self.dispatch(conn, job);
                return;
            }
            tracing::warn!(
                pool = %self.name,
                index,
                "free list held a connection that was not idle"
            );
        }

        if let Some(index) = self.vacant_index() {
            self.open_connection(index, job);
            return;
        }

        let deadline = job.timeout;
        let signals = self.signals.clone();
        let ticket = self.queue.enqueue(job, |ticket| {
            deadline.map(|limit| {
                TimerHandle::start(limit, move || {
                    let _ = signals.send(Signal::QueueExpired { ticket });
                })
            })
        });
        tracing::debug!(pool = %self.name, ticket, queued = self.queue.len(), "request queued");
    }

    /// Take an idle connection out of its slot, cancelling its reap timer
    fn checkout(&mut self, index: usize) -> Option<Connection> {
        let slot = &mut self.slots[index - 1];
        match std::mem::replace(slot, Slot::Vacant) {
            Slot::Idle { conn, idle_timer } => {
                if let Some(timer) = idle_timer {
                    timer.cancel();
                }
                *slot = Slot::Busy {
                    id: conn.id(),
                    doomed: false,
                };
                Some(conn)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    fn vacant_index(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_vacant).map(|pos| pos + 1)
    }

    fn dispatch(&self, conn: Connection, job: Job) {
        tracing::debug!(
            pool = %self.name,
            index = conn.index(),
            free = self.free.len(),
            queued = self.queue.len(),
            "dispatching query"
        );
        tokio::spawn(run_job(conn, job, self.events.clone(), self.signals.clone()));
    }

    /// Open a connection in the vacant slot `index` and run `job` on it
    fn open_connection(&mut self, index: usize, job: Job) {
        let id = self.next_id;
        self.next_id += 1;
        self.slots[index - 1] = Slot::Busy { id, doomed: false };
        tracing::debug!(pool = %self.name, index, "opening connection");

        let driver = self.driver.clone();
        let options = self.options.clone();
        let identity = self.identity.clone();
        let events = self.events.clone();
        let signals = self.signals.clone();
        let pool = self.name.clone();

        tokio::spawn(async move {
            let errors = signals.clone();
            let on_error = move |error: DriverError| {
                errors
                    .send(Signal::DriverError { index, id, error })
                    .is_ok()
            };
            match Connection::open(driver, &options, index, id, identity, on_error).await {
                Ok(conn) => {
                    events.emit(PoolEvent::ConnectionOpened { index });
                    run_job(conn, job, events, signals).await;
                }
                Err(err) => {
                    tracing::error!(pool = %pool, index, error = %err, "failed to open connection");
                    let _ = job.reply.send(Err(err));
                    let _ = signals.send(Signal::ConnectFailed { index });
                }
            }
        });
    }

    /// Take back a connection after its query
    fn release(&mut self, index: usize, conn: Connection) {
        let doomed = match &self.slots[index - 1] {
            Slot::Busy { id, doomed } if *id == conn.id() => *doomed,
            _ => {
                tracing::warn!(
                    pool = %self.name,
                    index,
                    "release for a connection the pool does not track"
                );
                self.closers.spawn(close(conn));
                return;
            }
        };

        if doomed || !conn.is_open() {
            tracing::debug!(
                pool = %self.name,
                index,
                state = ?conn.state(),
                "dropping broken connection"
            );
            self.retire(index, conn, CloseReason::Fatal);
            self.refill(index);
            return;
        }
        if self.shutting_down {
            self.retire(index, conn, CloseReason::Shutdown);
            return;
        }

        while let Some(waiter) = self.queue.dequeue() {
            let job = waiter.into_item();
            if job.reply.is_closed() {
                continue;
            }
            self.dispatch(conn, job);
            return;
        }

        let idle_timer = self.max_idle_time.map(|limit| {
            let signals = self.signals.clone();
            let id = conn.id();
            TimerHandle::start(limit, move || {
                let _ = signals.send(Signal::IdleExpired { index, id });
            })
        });
        self.free.push(index);
        self.slots[index - 1] = Slot::Idle { conn, idle_timer };
        tracing::debug!(pool = %self.name, index, free = self.free.len(), "connection idle");
    }

    /// Vacate `index` and close its connection in the background
    fn retire(&mut self, index: usize, conn: Connection, reason: CloseReason) {
        self.slots[index - 1] = Slot::Vacant;
        self.closers.spawn(close(conn));
        self.events.emit(PoolEvent::ConnectionClosed { index, reason });
    }

    /// Use a freshly vacated slot for the oldest live waiter, if any
    fn refill(&mut self, index: usize) {
        if self.shutting_down {
            return;
        }
        while let Some(waiter) = self.queue.dequeue() {
            let job = waiter.into_item();
            if job.reply.is_closed() {
                continue;
            }
            self.open_connection(index, job);
            return;
        }
    }

    fn expire_waiter(&mut self, ticket: u64) {
        let Some(waiter) = self.queue.remove(ticket) else {
            return;
        };
        let waited = waiter.enqueued_at.elapsed();
        let job = waiter.into_item();
        let limit = job.timeout.unwrap_or_default();
        tracing::warn!(
            pool = %self.name,
            limit_ms = limit.as_millis() as u64,
            waited_ms = waited.as_millis() as u64,
            queued = self.queue.len(),
            "request expired in queue"
        );
        let _ = job
            .reply
            .send(Err(PoolError::queue_timeout(limit, waited, &self.name)));
    }

    fn reap(&mut self, index: usize, id: u64) {
        match &self.slots[index - 1] {
            Slot::Idle { conn, .. } if conn.id() == id => {}
            _ => return,
        }
        self.free.remove(index);
        if let Slot::Idle { conn, .. } =
            std::mem::replace(&mut self.slots[index - 1], Slot::Vacant)
        {
            tracing::debug!(
                pool = %self.name,
                index,
                free = self.free.len(),
                "reaping idle connection"
            );
            self.retire(index, conn, CloseReason::IdleTimeout);
        }
    }

    fn driver_error(&mut self, index: usize, id: u64, error: DriverError) {
        let err = PoolError::from_driver(error, &self.identity);
        match &mut self.slots[index - 1] {
            Slot::Idle { conn, .. } if conn.id() == id => {
                self.events.emit(PoolEvent::Error(err.clone()));
                if !err.is_fatal() {
                    tracing::warn!(
                        pool = %self.name,
                        index,
                        error = %err,
                        "connection reported an error"
                    );
                    return;
                }
                tracing::error!(pool = %self.name, index, error = %err, "idle connection failed");
                self.free.remove(index);
                if let Slot::Idle { conn, .. } =
                    std::mem::replace(&mut self.slots[index - 1], Slot::Vacant)
                {
                    self.retire(index, conn, CloseReason::Fatal);
                }
            }
            Slot::Busy { id: busy, doomed } if *busy == id => {
                if *doomed {
                    return;
                }
                if err.is_fatal() {
                    tracing::error!(pool = %self.name, index, error = %err, "busy connection failed");
                    *doomed = true;
                }
                self.events.emit(PoolEvent::Error(err));
            }
            _ => {
                tracing::debug!(pool = %self.name, index, "error from a connection already gone");
            }
        }
    }

    fn heartbeat_tick(&mut self) {
        if self.shutting_down || !self.heartbeat.begin() {
            return;
        }
        let (reply, answer) = oneshot::channel();
        self.admit(Job {
            statement: Statement::from(self.heartbeat.query()),
            timeout: self.heartbeat.interval(),
            reply,
        });

        let signals = self.signals.clone();
        tokio::spawn(async move {
            let outcome = answer.await.unwrap_or(Err(PoolError::PoolClosed));
            let _ = signals.send(Signal::HeartbeatDone { outcome });
        });
    }

    /// Stop accepting work: fail queued requests, close idle connections and
    /// let busy ones close as they come back.
    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.heartbeat.stop();
        tracing::info!(
            pool = %self.name,
            queued = self.queue.len(),
            idle = self.free.len(),
            "shutting down pool"
        );

        for waiter in self.queue.drain() {
            let _ = waiter.into_item().reply.send(Err(PoolError::PoolClosed));
        }
        let idle: Vec<usize> = self.free.drain().collect();
        for index in idle {
            if let Slot::Idle { conn, .. } =
                std::mem::replace(&mut self.slots[index - 1], Slot::Vacant)
            {
                self.retire(index, conn, CloseReason::Shutdown);
            }
        }
    }

    fn stats(&self) -> PoolStats {
        let created = self.slots.iter().filter(|slot| !slot.is_vacant()).count();
        let busy = self
            .slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Busy { .. }))
            .count();
        PoolStats {
            created,
            busy,
            idle: self.free.len(),
            waiting: self.queue.len(),
            free_list: self.free.as_slice().to_vec(),
            health: self.heartbeat.tracker().last_status(),
            consecutive_heartbeat_failures: self.heartbeat.tracker().consecutive_failures(),
        }
    }
}

/// Run one job on a checked-out connection, then hand the connection back.
///
/// The release is sent right after the answer, with no suspension point in
/// between unless the connection has to be closed first.
async fn run_job(
    mut conn: Connection,
    job: Job,
    events: EventSender,
    signals: mpsc::UnboundedSender<Signal>,
) {
    let Job {
        statement,
        timeout,
        reply,
    } = job;
    conn.query(&statement, timeout, reply, &events).await;
    if !conn.is_open() {
        conn.close().await;
    }
    let _ = signals.send(Signal::Released {
        index: conn.index(),
        conn,
    });
}

async fn close(mut conn: Connection) {
    conn.close().await;
}
