//! Executing one isolated statement with the commit/rollback discipline of its category.

use sql_gate_core::statement::IsolatedStatement;

use crate::store::{DriverError, Row, Store};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// `rows` is `Some` for read-only statements and `None` for committed mutations.
    Success { rows: Option<Vec<Row>> },
    Warning(String),
    Error(String),
}

impl From<DriverError> for ExecutionOutcome {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Warning(message) => ExecutionOutcome::Warning(message),
            DriverError::Error(message) => ExecutionOutcome::Error(message),
        }
    }
}

/// An open transaction on a store. Dropping it without `commit` rolls back.
struct Transaction<'a, S: Store> {
    store: &'a mut S,
    open: bool,
}

impl<'a, S: Store> Transaction<'a, S> {
    fn begin(store: &'a mut S) -> Result<Self, DriverError> {
        store.begin()?;
        Ok(Self { store, open: true })
    }

    fn execute(&mut self, statement: &str) -> Result<(), DriverError> {
        self.store.execute(statement)
    }

    fn commit(mut self) -> Result<(), DriverError> {
        self.store.commit()?;
        self.open = false;
        Ok(())
    }

    fn rollback(mut self) {
        self.open = false;
        if let Err(err) = self.store.rollback() {
            tracing::warn!(err = %err, "rollback failed");
        }
    }
}

impl<S: Store> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.open
            && let Err(err) = self.store.rollback()
        {
            tracing::warn!(err = %err, "rollback of abandoned transaction failed");
        }
    }
}

#[derive(Debug)]
pub struct TransactionExecutor<S> {
    store: S,
    fetch_batch_size: usize,
}

impl<S: Store> TransactionExecutor<S> {
    pub fn new(store: S, fetch_batch_size: usize) -> Self {
        Self {
            store,
            fetch_batch_size: fetch_batch_size.max(1),
        }
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Commit on success; roll back on any warning or error. Never leaves the
    /// statement half applied, and never leaves a transaction open on the store.
    pub fn execute_mutating(&mut self, statement: &IsolatedStatement) -> ExecutionOutcome {
        let mut tx = match Transaction::begin(&mut self.store) {
            Ok(tx) => tx,
            Err(err) => return err.into(),
        };

        if let Err(err) = tx.execute(statement.as_str()) {
            tracing::debug!(err = %err, "statement failed; rolling back");
            tx.rollback();
            return err.into();
        }

        // A failed commit leaves `tx` open, so its drop rolls back.
        match tx.commit() {
            Ok(()) => ExecutionOutcome::Success { rows: None },
            Err(err) => {
                tracing::debug!(err = %err, "commit failed; rolled back");
                err.into()
            }
        }
    }

    /// Fetch at most one batch of rows. Nothing is committed or rolled back.
    pub fn execute_read_only(&mut self, statement: &IsolatedStatement) -> ExecutionOutcome {
        match self
            .store
            .fetch_many(statement.as_str(), self.fetch_batch_size)
        {
            Ok(rows) => ExecutionOutcome::Success { rows: Some(rows) },
            Err(err) => err.into(),
        }
    }
}
