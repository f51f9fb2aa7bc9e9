use sql_gate::store::sqlite::SqliteStore;
use sql_gate::store::{DriverResult, Row, Store};

#[cfg(feature = "postgres")]
use sql_gate::store::postgres::PostgresStore;

type SqlitePool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;
type SqliteConn = r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>;

#[cfg(feature = "postgres")]
type PostgresPool =
    r2d2::Pool<r2d2_postgres::PostgresConnectionManager<r2d2_postgres::postgres::NoTls>>;
#[cfg(feature = "postgres")]
type PostgresConn = r2d2::PooledConnection<
    r2d2_postgres::PostgresConnectionManager<r2d2_postgres::postgres::NoTls>,
>;

#[derive(Clone)]
pub(super) enum Backend {
    Sqlite {
        pool: SqlitePool,
    },
    #[cfg(feature = "postgres")]
    Postgres {
        pool: PostgresPool,
    },
}

impl Backend {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Backend::Sqlite { .. } => "sqlite",
            #[cfg(feature = "postgres")]
            Backend::Postgres { .. } => "postgres",
        }
    }
}

/// One pooled connection checked out for the duration of one request.
pub(super) enum BackendStore {
    Sqlite(Box<SqliteStore<SqliteConn>>),
    #[cfg(feature = "postgres")]
    Postgres(Box<PostgresStore<PostgresConn>>),
}

pub(super) enum CancelHandle {
    Sqlite(rusqlite::InterruptHandle),
}

impl CancelHandle {
    pub(super) fn cancel(&self) {
        match self {
            CancelHandle::Sqlite(handle) => handle.interrupt(),
        }
    }
}

impl BackendStore {
    /// Postgres has no handle; its server-side `statement_timeout` bounds execution.
    pub(super) fn open(backend: Backend) -> sql_gate::Result<(Self, Option<CancelHandle>)> {
        match backend {
            Backend::Sqlite { pool } => {
                let conn = pool
                    .get()
                    .map_err(|err| sql_gate::Error::Db(err.to_string()))?;
                let cancel = Some(CancelHandle::Sqlite(conn.get_interrupt_handle()));
                Ok((
                    Self::Sqlite(Box::new(SqliteStore::from_connection(conn))),
                    cancel,
                ))
            }
            #[cfg(feature = "postgres")]
            Backend::Postgres { pool } => {
                let client = pool
                    .get()
                    .map_err(|err| sql_gate::Error::Db(err.to_string()))?;
                Ok((
                    Self::Postgres(Box::new(PostgresStore::from_client(client))),
                    None,
                ))
            }
        }
    }
}

impl Store for BackendStore {
    fn begin(&mut self) -> DriverResult<()> {
        match self {
            BackendStore::Sqlite(store) => store.begin(),
            #[cfg(feature = "postgres")]
            BackendStore::Postgres(store) => store.begin(),
        }
    }

    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        match self {
            BackendStore::Sqlite(store) => store.execute(statement),
            #[cfg(feature = "postgres")]
            BackendStore::Postgres(store) => store.execute(statement),
        }
    }

    fn commit(&mut self) -> DriverResult<()> {
        match self {
            BackendStore::Sqlite(store) => store.commit(),
            #[cfg(feature = "postgres")]
            BackendStore::Postgres(store) => store.commit(),
        }
    }

    fn rollback(&mut self) -> DriverResult<()> {
        match self {
            BackendStore::Sqlite(store) => store.rollback(),
            #[cfg(feature = "postgres")]
            BackendStore::Postgres(store) => store.rollback(),
        }
    }

    fn fetch_many(&mut self, statement: &str, limit: usize) -> DriverResult<Vec<Row>> {
        match self {
            BackendStore::Sqlite(store) => store.fetch_many(statement, limit),
            #[cfg(feature = "postgres")]
            BackendStore::Postgres(store) => store.fetch_many(statement, limit),
        }
    }
}
