//! Statements and SQL formatting
//!
//! A statement is either raw SQL or SQL with `:name` placeholders plus a map
//! of named parameters. Placeholders are substituted with escaped literals
//! right before the statement is sent to the server.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\w+)").expect("placeholder pattern is valid"));

/// A statement submitted to the pool
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SQL sent verbatim
    Raw(String),
    /// SQL with `:name` placeholders and their values
    Params {
        sql: String,
        params: HashMap<String, Value>,
    },
}

impl Statement {
    /// Create a parameterized statement
    pub fn with_params<K, V, I>(sql: impl Into<String>, params: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Statement::Params {
            sql: sql.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The SQL template, before placeholder substitution
    pub fn sql(&self) -> &str {
        match self {
            Statement::Raw(sql) => sql,
            Statement::Params { sql, .. } => sql,
        }
    }

    /// Render the final SQL text sent to the server
    pub fn render(&self) -> String {
        match self {
            Statement::Raw(sql) => sql.clone(),
            Statement::Params { sql, params } => format(sql, params),
        }
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::Raw(sql.to_string())
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::Raw(sql)
    }
}

/// Replace every `:name` placeholder in `sql` with the escaped value of
/// `params[name]`. Unknown names render as `NULL`.
pub fn format(sql: &str, params: &HashMap<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(sql, |caps: &Captures<'_>| match params.get(&caps[1]) {
            Some(value) => escape(value),
            None => "NULL".to_string(),
        })
        .into_owned()
}

/// Escape a value as a MySQL literal
pub fn escape(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::String(v) => escape_string(v),
        Value::Bytes(v) => {
            let mut hex = String::with_capacity(v.len() * 2 + 3);
            hex.push_str("X'");
            for b in v {
                let _ = write!(hex, "{:02x}", b);
            }
            hex.push('\'');
            hex
        }
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(_) => format!("({})", escape(item)),
                other => escape(other),
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
