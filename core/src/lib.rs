#![forbid(unsafe_code)]

//! Core building blocks of `sql-gate`, free of any database driver or HTTP stack.
//!
//! - `policy`: the four statement categories and their keyword allow-lists
//! - `statement`: truncation of a command at the first statement separator
//! - `credentials`: the fixed username → secret store
//! - `session`: signed session tokens bound to a username
//! - `config`: the gate configuration model and its validation

mod error;

pub mod config;
pub mod credentials;
pub mod policy;
pub mod session;
pub mod statement;

pub use error::{Error, Result};
