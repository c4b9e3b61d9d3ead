//! MySQL connection implementation

use async_trait::async_trait;
use mysql_async::{Conn, Row as MySqlRow, consts::ColumnType, prelude::*};
use sqlpool_core::{DriverError, DriverResult, QueryResult, RawConnection, Row, Value};

/// One physical MySQL connection
pub struct MySqlConnection {
    /// `None` once the connection has been ended
    conn: Option<Conn>,
}

impl MySqlConnection {
    pub fn new(conn: Conn) -> Self {
        Self { conn: Some(conn) }
    }
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("connection_id", &self.conn.as_ref().map(|c| c.id()))
            .finish()
    }
}

/// Classify a client error. Anything that means the socket or session is
/// gone is fatal; server-side statement errors are not.
pub(crate) fn map_error(err: mysql_async::Error) -> DriverError {
    match err {
        mysql_async::Error::Server(e) => {
            DriverError::new(format!("ER {} ({}): {}", e.code, e.state, e.message))
        }
        mysql_async::Error::Io(e) => {
            DriverError::fatal(e.to_string()).with_name("PROTOCOL_CONNECTION_LOST")
        }
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            DriverError::fatal("connection closed by the server")
                .with_name("PROTOCOL_CONNECTION_LOST")
        }
        other => DriverError::new(other.to_string()),
    }
}

/// Convert a mysql_async value, using the column type to interpret byte
/// strings from the text protocol.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => s
                    .parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| s.parse::<u64>().map(Value::UInt))
                    .unwrap_or(Value::String(s)),
                ColumnType::MYSQL_TYPE_FLOAT
                | ColumnType::MYSQL_TYPE_DOUBLE
                | ColumnType::MYSQL_TYPE_DECIMAL
                | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    s.parse::<f64>().map(Value::Float).unwrap_or(Value::String(s))
                }
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int(i),
        mysql_async::Value::UInt(u) => Value::UInt(u),
        mysql_async::Value::Float(f) => Value::Float(f as f64),
        mysql_async::Value::Double(d) => Value::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            if hour == 0 && min == 0 && sec == 0 && micro == 0 {
                Value::String(format!("{:04}-{:02}-{:02}", year, month, day))
            } else if micro == 0 {
                Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                ))
            } else {
                Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, min, sec, micro
                ))
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn rows_to_result(
    rows: Vec<MySqlRow>,
    affected_rows: u64,
    last_insert_id: Option<u64>,
) -> QueryResult {
    let (columns, column_types): (Vec<String>, Vec<ColumnType>) = rows
        .first()
        .map(|first| {
            first
                .columns_ref()
                .iter()
                .map(|col| (col.name_str().to_string(), col.column_type()))
                .unzip()
        })
        .unwrap_or_default();

    let rows = rows
        .into_iter()
        .map(|mysql_row| {
            let values = column_types
                .iter()
                .enumerate()
                .map(|(idx, col_type)| {
                    let mysql_val: mysql_async::Value =
                        mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
                    mysql_value_to_value(mysql_val, *col_type)
                })
                .collect();
            Row::new(columns.clone(), values)
        })
        .collect();

    QueryResult {
        columns,
        rows,
        affected_rows,
        last_insert_id,
    }
}

#[async_trait]
impl RawConnection for MySqlConnection {
    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&mut self, sql: &str) -> DriverResult<QueryResult> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DriverError::fatal("connection already ended"))?;

        let start_time = std::time::Instant::now();
        let rows: Vec<MySqlRow> = conn.query(sql).await.map_err(map_error)?;
        let result = rows_to_result(rows, conn.affected_rows(), conn.last_insert_id());

        tracing::debug!(
            row_count = result.row_count(),
            affected_rows = result.affected_rows,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(result)
    }

    async fn end(&mut self) -> DriverResult<()> {
        match self.conn.take() {
            Some(conn) => conn.disconnect().await.map_err(map_error),
            None => Ok(()),
        }
    }
}
