use std::fmt;

/// One result row, one JSON value per column.
pub type Row = Vec<serde_json::Value>;

/// A failure reported by the database driver while running a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Non-fatal condition; the statement may have partially run.
    Warning(String),
    Error(String),
}

impl DriverError {
    pub fn message(&self) -> &str {
        match self {
            DriverError::Warning(message) | DriverError::Error(message) => message,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Warning(message) => write!(f, "warning: {message}"),
            DriverError::Error(message) => write!(f, "error: {message}"),
        }
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// The database connection capability a statement is executed against.
///
/// One value wraps one connection for the duration of one request. The store does
/// not serialize access against other requests; with a single pooled connection
/// the pool does, and nothing isolates one request's reads from another's writes.
pub trait Store {
    fn begin(&mut self) -> DriverResult<()>;

    /// Run `statement` to completion, discarding any rows it produces.
    fn execute(&mut self, statement: &str) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    /// Must succeed when no transaction is open.
    fn rollback(&mut self) -> DriverResult<()>;

    /// Run `statement` and return at most `limit` rows; the rest are discarded.
    fn fetch_many(&mut self, statement: &str, limit: usize) -> DriverResult<Vec<Row>>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn begin(&mut self) -> DriverResult<()> {
        (**self).begin()
    }

    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        (**self).execute(statement)
    }

    fn commit(&mut self) -> DriverResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> DriverResult<()> {
        (**self).rollback()
    }

    fn fetch_many(&mut self, statement: &str, limit: usize) -> DriverResult<Vec<Row>> {
        (**self).fetch_many(statement, limit)
    }
}

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
