use std::ops::Deref;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;

use sql_gate_core::{Error, Result};

use super::{DriverError, DriverResult, Row, Store};

pub struct SqliteStoreWithConn<C> {
    conn: C,
}

pub type SqliteStore<C = Box<rusqlite::Connection>> = SqliteStoreWithConn<C>;

impl SqliteStoreWithConn<Box<rusqlite::Connection>> {
    pub fn new(conn: rusqlite::Connection) -> Self {
        let _ = conn.busy_timeout(Duration::from_secs(5));
        Self {
            conn: Box::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path).map_err(|err| Error::Db(err.to_string()))?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            rusqlite::Connection::open_in_memory().map_err(|err| Error::Db(err.to_string()))?;
        Ok(Self::new(conn))
    }
}

impl<C> SqliteStoreWithConn<C> {
    pub fn from_connection(conn: C) -> Self {
        Self { conn }
    }
}

impl<C> SqliteStoreWithConn<C>
where
    C: Deref<Target = rusqlite::Connection>,
{
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl<C> Store for SqliteStoreWithConn<C>
where
    C: Deref<Target = rusqlite::Connection>,
{
    fn begin(&mut self) -> DriverResult<()> {
        self.conn.execute_batch("BEGIN").map_err(driver_err)
    }

    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        let mut stmt = self.conn.prepare(statement).map_err(driver_err)?;
        let mut rows = stmt.query([]).map_err(driver_err)?;
        while rows.next().map_err(driver_err)?.is_some() {}
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.conn.execute_batch("COMMIT").map_err(driver_err)
    }

    fn rollback(&mut self) -> DriverResult<()> {
        // Some failures (SQLITE_FULL, SQLITE_IOERR, ...) already rolled the transaction back.
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK").map_err(driver_err)
    }

    fn fetch_many(&mut self, statement: &str, limit: usize) -> DriverResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(statement).map_err(driver_err)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([]).map_err(driver_err)?;

        let mut out = Vec::new();
        while out.len() < limit {
            let Some(row) = rows.next().map_err(driver_err)? else {
                break;
            };
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(value_to_json(row.get_ref(idx).map_err(driver_err)?));
            }
            out.push(values);
        }
        Ok(out)
    }
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(v) => serde_json::Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into()),
        ValueRef::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
    }
}

fn driver_err(err: rusqlite::Error) -> DriverError {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let message = message.unwrap_or_else(|| code.to_string());
            if code.extended_code & 0xff == rusqlite::ffi::SQLITE_WARNING {
                DriverError::Warning(message)
            } else {
                DriverError::Error(message)
            }
        }
        other => DriverError::Error(other.to_string()),
    }
}
