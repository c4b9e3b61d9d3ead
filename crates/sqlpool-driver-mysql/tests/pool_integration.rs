//! Pool integration tests against a live MySQL server
//!
//! These tests require a running MySQL or MariaDB server, configured through
//! `MYSQL_HOST`, `MYSQL_PORT`, `MYSQL_USER`, `MYSQL_PASSWORD` and `MYSQL_DATABASE`.
//! Run with: cargo test -p sqlpool-driver-mysql --test pool_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use sqlpool_connection::{ConnectOptions, Pool, PoolConfig, PoolEvent, Statement, Value};
use sqlpool_driver_mysql::MySqlDriver;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn test_config(max_connections: usize) -> PoolConfig {
    let port = env_or("MYSQL_PORT", "3306")
        .parse()
        .expect("MYSQL_PORT must be a number");
    let mut options =
        ConnectOptions::new(env_or("MYSQL_HOST", "127.0.0.1"), env_or("MYSQL_USER", "root"))
            .with_port(port);
    if let Ok(password) = std::env::var("MYSQL_PASSWORD") {
        options = options.with_password(password);
    }
    if let Ok(database) = std::env::var("MYSQL_DATABASE") {
        options = options.with_database(database);
    }
    PoolConfig::new(max_connections)
        .with_name("integration")
        .with_heartbeat_interval_ms(0)
        .with_connection(options)
}

fn start(config: PoolConfig) -> Pool {
    Pool::new(config, Arc::new(MySqlDriver::new())).expect("Failed to start pool")
}

#[tokio::test]
#[ignore = "requires running MySQL server"]
async fn test_select_through_pool() {
    let pool = start(test_config(2));

    let result = pool
        .query("SELECT 1 AS one, 'two' AS two", None)
        .await
        .expect("query failed");
    assert_eq!(result.columns, vec!["one".to_string(), "two".to_string()]);
    let row = result.first().expect("Should return one row");
    assert_eq!(row.get_by_name("one"), Some(&Value::Int(1)));
    assert_eq!(row.get_by_name("two"), Some(&Value::from("two")));

    pool.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
#[ignore = "requires running MySQL server"]
async fn test_params_are_escaped() {
    let pool = start(test_config(1));

    let statement = Statement::with_params("SELECT :name AS name", [("name", "O'Brien")]);
    let result = pool.query(statement, None).await.expect("query failed");
    assert_eq!(
        result.first().and_then(|row| row.get(0)),
        Some(&Value::from("O'Brien"))
    );

    pool.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
#[ignore = "requires running MySQL server"]
async fn test_server_error_keeps_connection() {
    let pool = start(test_config(1));

    let err = pool
        .query("SELECT * FROM sqlpool_table_that_does_not_exist", None)
        .await
        .expect_err("query against a missing table should fail");
    assert!(!err.is_fatal());
    assert_eq!(err.name(), "MysqlError");

    pool.query("SELECT 1", None).await.expect("connection should still work");
    let stats = pool.stats().await.expect("stats failed");
    assert_eq!(stats.created(), 1);

    pool.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
#[ignore = "requires running MySQL server"]
async fn test_query_timeout() {
    let pool = start(test_config(1));
    let mut events = pool.subscribe();

    let err = pool
        .query("SELECT SLEEP(1)", Some(Duration::from_millis(100)))
        .await
        .expect_err("slow query should time out");
    assert_eq!(err.name(), "QueryTimeout");

    match events.recv().await.expect("event channel closed") {
        PoolEvent::Timeout { sql, .. } => assert_eq!(sql, "SELECT SLEEP(1)"),
        other => panic!("unexpected event {:?}", other),
    }

    pool.shutdown().await.expect("shutdown failed");
}

#[tokio::test]
#[ignore = "requires running MySQL server"]
async fn test_default_heartbeat_query() {
    let config = test_config(1).with_heartbeat_interval_ms(50);
    let pool = start(config);
    let mut events = pool.subscribe();

    loop {
        match events.recv().await.expect("event channel closed") {
            PoolEvent::State(report) => {
                let row = report.result.first().expect("heartbeat should return a row");
                assert_eq!(
                    row.get_by_name("Variable_name"),
                    Some(&Value::from("read_only"))
                );
                break;
            }
            PoolEvent::Error(err) => panic!("heartbeat failed: {}", err),
            _ => {}
        }
    }

    pool.shutdown().await.expect("shutdown failed");
}
