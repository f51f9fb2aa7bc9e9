use std::ops::DerefMut;

use postgres::fallible_iterator::FallibleIterator;
use postgres::types::{ToSql, Type};

use sql_gate_core::{Error, Result};

use super::{DriverError, DriverResult, Row, Store};

/// SQLSTATE class reserved for warnings.
const WARNING_SQLSTATE_CLASS: &str = "01";

pub struct PostgresStoreWithClient<C> {
    client: C,
}

pub type PostgresStore<C = Box<postgres::Client>> = PostgresStoreWithClient<C>;

impl PostgresStoreWithClient<Box<postgres::Client>> {
    pub fn new(client: postgres::Client) -> Self {
        Self {
            client: Box::new(client),
        }
    }

    pub fn connect(url: &str) -> Result<Self> {
        let client = postgres::Client::connect(url, postgres::NoTls)
            .map_err(|err| Error::Db(err.to_string()))?;
        Ok(Self::new(client))
    }
}

impl<C> PostgresStoreWithClient<C> {
    pub fn from_client(client: C) -> Self {
        Self { client }
    }
}

impl<C> Store for PostgresStoreWithClient<C>
where
    C: DerefMut<Target = postgres::Client>,
{
    fn begin(&mut self) -> DriverResult<()> {
        self.client.batch_execute("BEGIN").map_err(driver_err)
    }

    fn execute(&mut self, statement: &str) -> DriverResult<()> {
        // The extended protocol refuses more than one statement per call on the server side.
        self.client
            .execute(statement, &[])
            .map(|_| ())
            .map_err(driver_err)
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.client.batch_execute("COMMIT").map_err(driver_err)
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.client.batch_execute("ROLLBACK").map_err(driver_err)
    }

    fn fetch_many(&mut self, statement: &str, limit: usize) -> DriverResult<Vec<Row>> {
        let mut rows = self
            .client
            .query_raw(statement, std::iter::empty::<&dyn ToSql>())
            .map_err(driver_err)?;

        let mut out = Vec::new();
        while out.len() < limit {
            let Some(row) = rows.next().map_err(driver_err)? else {
                break;
            };
            out.push(row_to_json(&row));
        }
        Ok(out)
    }
}

fn row_to_json(row: &postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| column_to_json(row, idx, column.type_()))
        .collect()
}

fn column_to_json(row: &postgres::Row, idx: usize, ty: &Type) -> serde_json::Value {
    fn get<'a, T>(row: &'a postgres::Row, idx: usize) -> serde_json::Value
    where
        T: postgres::types::FromSql<'a> + Into<serde_json::Value>,
    {
        match row.try_get::<_, Option<T>>(idx) {
            Ok(Some(value)) => value.into(),
            _ => serde_json::Value::Null,
        }
    }

    if *ty == Type::BOOL {
        get::<bool>(row, idx)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx)
    } else if *ty == Type::OID {
        get::<u32>(row, idx)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx)
    } else if *ty == Type::BYTEA {
        match row.try_get::<_, Option<Vec<u8>>>(idx) {
            Ok(Some(bytes)) => serde_json::Value::String(hex::encode(bytes)),
            _ => serde_json::Value::Null,
        }
    } else {
        // Anything without a text decoding (numeric, timestamps, ...) becomes null.
        get::<String>(row, idx)
    }
}

fn driver_err(err: postgres::Error) -> DriverError {
    match err.as_db_error() {
        Some(db) if db.code().code().starts_with(WARNING_SQLSTATE_CLASS) => {
            DriverError::Warning(db.message().to_string())
        }
        Some(db) => DriverError::Error(db.message().to_string()),
        None => DriverError::Error(err.to_string()),
    }
}
