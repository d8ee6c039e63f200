//! SQLite-backed procedural store
//!
//! Statements run as written, so the primary key declared in the DDL is
//! enforced by SQLite itself. A unique-constraint failure on insert surfaces
//! as [`StorageError::ConstraintViolation`] carrying the table and the first
//! bound parameter as the id.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, OpenFlags};
use tracing::debug;

use crate::error::StorageError;
use crate::schema::Row;
use crate::storage_traits::{RelationalStore, StorageResult};

/// Relational store over one SQLite connection.
///
/// Calls are serialized on the connection and run on the calling thread.
pub struct SqliteRelationalStore {
    conn: Mutex<Connection>,
}

impl SqliteRelationalStore {
    /// Open or create the database file at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Backend(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| StorageError::Backend(format!("open {}: {e}", path.display())))?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private database that disappears with the store.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Backend(format!("open in-memory: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_sql(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Integer(i),
            (None, Some(f)) => Value::Real(f),
            (None, None) => Value::Text(n.to_string()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Blob(bytes) => serde_json::Value::from(bytes.to_vec()),
    }
}

/// Table named by `INSERT INTO <table> ...`.
fn insert_target(statement: &str) -> String {
    statement
        .split_whitespace()
        .nth(2)
        .map(|t| t.trim_matches(|c: char| c == '"' || c == '(').to_string())
        .unwrap_or_default()
}

fn param_id(params: &[serde_json::Value]) -> String {
    match params.first() {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn map_error(err: rusqlite::Error, statement: &str, params: &[serde_json::Value]) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        if failure.code == ErrorCode::ConstraintViolation {
            let table = insert_target(statement);
            let id = param_id(params);
            debug!(table = %table, id = %id, "duplicate primary key rejected");
            return StorageError::ConstraintViolation { table, id };
        }
    }
    if matches!(
        err,
        rusqlite::Error::ExecuteReturnedResults | rusqlite::Error::InvalidParameterCount(..)
    ) {
        return StorageError::InvalidStatement(err.to_string());
    }

    let message = err.to_string();
    if let Some(rest) = message.strip_prefix("no such table: ") {
        let table = rest.split_whitespace().next().unwrap_or(rest).to_string();
        return StorageError::UnknownTable { table };
    }
    StorageError::Backend(message)
}

#[async_trait]
impl RelationalStore for SqliteRelationalStore {
    async fn execute(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<u64> {
        let conn = self.conn();
        let changed = conn
            .execute(statement, params_from_iter(params.iter().map(to_sql)))
            .map_err(|e| map_error(e, statement, params))?;
        Ok(changed as u64)
    }

    async fn query(&self, statement: &str, params: &[serde_json::Value]) -> StorageResult<Vec<Row>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(statement)
            .map_err(|e| map_error(e, statement, params))?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(|e| map_error(e, statement, params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| map_error(e, statement, params))? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                let value = row
                    .get_ref(idx)
                    .map_err(|e| map_error(e, statement, params))?;
                values.push(from_sql(value));
            }
            out.push(values);
        }
        Ok(out)
    }
}
