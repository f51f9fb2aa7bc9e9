#![forbid(unsafe_code)]

//! `sql-gate` runs client-supplied SQL through a category allow-list against a shared store.
//!
//! - `store`: database capability trait + SQLite/Postgres implementations
//! - `executor`: commit/rollback discipline for a single isolated statement
//! - `pipeline`: authenticate → parse → classify → isolate → execute → map

pub mod executor;
pub mod pipeline;
pub mod store;

pub use sql_gate_core::{Error, Result};
