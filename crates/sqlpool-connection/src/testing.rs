//! Scriptable in-memory driver for pool tests
//!
//! Statements are matched against regex rules, first match wins:
//!
//! - `SHOW VARIABLES LIKE "READ_ONLY"` answers one `READ_ONLY = OFF` row
//! - anything containing `fatal` fails with a fatal `TestFatal`
//! - anything containing `error` fails with `TestError`
//!
//! Statements starting with `SLEEP n` wait n milliseconds first. Unmatched
//! statements echo their SQL back as a single `sql` column.

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use sqlpool_core::{
    ConnectOptions, Driver, DriverError, DriverResult, QueryResult, RawConnection, Value,
};
use tokio::sync::mpsc;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process, honoring `RUST_LOG`
pub(crate) fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// What a matching rule answers
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Rows(QueryResult),
    Fail(DriverError),
}

#[derive(Default)]
struct MockState {
    rules: Mutex<Vec<(Regex, Reply)>>,
    connects: AtomicUsize,
    ends: AtomicUsize,
    fail_connect: AtomicBool,
    error_senders: Mutex<Vec<mpsc::UnboundedSender<DriverError>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockState {
    fn reply_for(&self, sql: &str) -> Option<Reply> {
        self.rules
            .lock()
            .iter()
            .find(|(pattern, _)| pattern.is_match(sql))
            .map(|(_, reply)| reply.clone())
    }
}

/// Counts a query as running until dropped
struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        let driver = Self {
            state: Arc::new(MockState::default()),
        };
        driver.on(
            r#"(?i)SHOW\s+Variables\s+like\s+"READ_ONLY""#,
            Reply::Rows(QueryResult::from_rows(
                vec!["Variable_name".to_string(), "Value".to_string()],
                vec![vec![Value::from("READ_ONLY"), Value::from("OFF")]],
            )),
        );
        driver.on(
            "(?i)fatal",
            Reply::Fail(DriverError::fatal("connection lost").with_name("TestFatal")),
        );
        driver.on(
            "(?i)error",
            Reply::Fail(DriverError::new("statement failed").with_name("TestError")),
        );
        driver
    }

    /// Add a rule after the existing ones
    pub(crate) fn on(&self, pattern: &str, reply: Reply) {
        let pattern = Regex::new(pattern).unwrap();
        self.state.rules.lock().push((pattern, reply));
    }

    pub(crate) fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Successful connects so far; the n-th connection is number n
    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn ends(&self) -> usize {
        self.state.ends.load(Ordering::SeqCst)
    }

    /// Highest number of queries ever running at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every statement run so far, in order
    pub(crate) fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// Report an error from connection `number` outside of any query
    pub(crate) fn inject_error(&self, number: usize, error: DriverError) {
        let senders = self.state.error_senders.lock();
        senders[number - 1].send(error).unwrap();
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, _options: &ConnectOptions) -> DriverResult<Box<dyn RawConnection>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(DriverError::new("connect ECONNREFUSED"));
        }
        let number = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            number,
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    number: usize,
}

fn sleep_millis(sql: &str) -> Option<u64> {
    let rest = sql.trim().strip_prefix("SLEEP ")?;
    rest.split_whitespace().next()?.parse().ok()
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn query(&mut self, sql: &str) -> DriverResult<QueryResult> {
        let _running = InFlight::enter(&self.state);
        self.state.executed.lock().push(sql.to_string());
        if let Some(ms) = sleep_millis(sql) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        match self.state.reply_for(sql) {
            Some(Reply::Rows(result)) => Ok(result),
            Some(Reply::Fail(err)) => Err(err),
            None => Ok(QueryResult::from_rows(
                vec!["sql".to_string()],
                vec![vec![Value::from(sql)]],
            )),
        }
    }

    async fn end(&mut self) -> DriverResult<()> {
        self.state.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn take_error_events(&mut self) -> Option<mpsc::UnboundedReceiver<DriverError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut senders = self.state.error_senders.lock();
        if senders.len() < self.number {
            senders.resize_with(self.number, || tx.clone());
        }
        senders[self.number - 1] = tx;
        Some(rx)
    }
}
