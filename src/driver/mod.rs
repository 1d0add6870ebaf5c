//! Driver abstraction over physical database connections.
//!
//! # Responsibilities
//! - Execute one query against one named connection
//! - Run the statistics probe used for load estimates
//! - Classify failures as unreachable (connection level) or query level

pub mod memory;

use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::query::Query;

pub use memory::MemoryDriver;

/// Errors raised by a driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The connection could not be used at all.
    #[error("connection {connection} unreachable: {reason}")]
    Unreachable { connection: String, reason: String },

    /// The database rejected the query.
    #[error("query failed: {0}")]
    Query(String),
}

/// A physical connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub name: String,
    pub url: Url,
}

impl Connection {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }
}

/// Raw driver result.
pub enum Cursor {
    /// A direct value.
    Value(Value),
    /// Rows produced lazily.
    Rows(Box<dyn Iterator<Item = Result<Value, DriverError>> + Send>),
}

impl Cursor {
    /// Force the cursor, collecting rows into a JSON array.
    pub fn materialize(self) -> Result<Value, DriverError> {
        match self {
            Cursor::Value(value) => Ok(value),
            Cursor::Rows(rows) => rows.collect::<Result<Vec<_>, _>>().map(Value::Array),
        }
    }

    /// Take a direct value; a lazy cursor is not a scalar.
    pub fn into_scalar(self) -> Result<Value, DriverError> {
        match self {
            Cursor::Value(value) => Ok(value),
            Cursor::Rows(_) => Err(DriverError::Query(
                "scalar operation returned a row cursor".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Cursor::Rows(_) => f.write_str("Rows(..)"),
        }
    }
}

/// Executes queries on physical connections.
pub trait Driver: Send + Sync + 'static {
    /// Run `query` on `connection`.
    fn execute<'a>(
        &'a self,
        connection: &'a Connection,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Cursor, DriverError>>;

    /// Run the load probe `operation` on `connection`.
    fn probe<'a>(
        &'a self,
        connection: &'a Connection,
        operation: &'a str,
    ) -> BoxFuture<'a, Result<f64, DriverError>>;
}
