//! In-process driver with one isolated table store per connection.
//!
//! Each connection behaves like an independent replica: writes land only
//! on the connection that executed them. Load, latency and reachability
//! are programmable so routing and failure paths can be exercised.

use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};

use crate::driver::{Connection, Cursor, Driver, DriverError};
use crate::query::Query;

/// Driver backed by in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    /// (connection, target) -> rows.
    tables: DashMap<(String, String), Vec<Value>>,
    loads: DashMap<String, f64>,
    latency: DashMap<String, Duration>,
    unreachable: DashMap<String, String>,
    executed: DashMap<String, usize>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows of `target` on `connection`.
    pub fn seed(&self, connection: &str, target: &str, rows: Vec<Value>) {
        self.tables
            .insert((connection.to_string(), target.to_string()), rows);
    }

    /// Rows of `target` currently stored on `connection`.
    pub fn rows(&self, connection: &str, target: &str) -> Vec<Value> {
        self.tables
            .get(&(connection.to_string(), target.to_string()))
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    /// Value returned by probes on `connection`.
    pub fn set_load(&self, connection: &str, load: f64) {
        self.loads.insert(connection.to_string(), load);
    }

    /// Delay applied before every call on `connection`.
    pub fn set_latency(&self, connection: &str, latency: Duration) {
        self.latency.insert(connection.to_string(), latency);
    }

    /// Make every call on `connection` fail as unreachable.
    pub fn set_unreachable(&self, connection: &str, reason: impl Into<String>) {
        self.unreachable.insert(connection.to_string(), reason.into());
    }

    pub fn set_reachable(&self, connection: &str) {
        self.unreachable.remove(connection);
    }

    /// Number of application queries executed on `connection`.
    pub fn executed(&self, connection: &str) -> usize {
        self.executed.get(connection).map(|c| *c).unwrap_or(0)
    }

    async fn enter(&self, connection: &Connection) -> Result<(), DriverError> {
        let delay = self.latency.get(&connection.name).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.unreachable.get(&connection.name) {
            return Err(DriverError::Unreachable {
                connection: connection.name.clone(),
                reason: reason.value().clone(),
            });
        }
        Ok(())
    }

    fn run(&self, connection: &Connection, query: &Query) -> Result<Cursor, DriverError> {
        let key = (connection.name.clone(), query.target.clone());
        match query.operation.as_str() {
            "all" => {
                let rows = self.tables.get(&key).map(|r| r.value().clone()).unwrap_or_default();
                Ok(Cursor::Rows(Box::new(rows.into_iter().map(Ok))))
            }
            "filter" => {
                let rows = self.tables.get(&key).map(|r| r.value().clone()).unwrap_or_default();
                let filter = query.kwargs.clone();
                Ok(Cursor::Rows(Box::new(
                    rows.into_iter()
                        .filter(move |row| matches(row, &filter))
                        .map(Ok),
                )))
            }
            "get" => {
                let table = self.tables.get(&key);
                let found = table
                    .as_ref()
                    .and_then(|rows| rows.iter().find(|row| matches(row, &query.kwargs)).cloned());
                found
                    .map(Cursor::Value)
                    .ok_or_else(|| DriverError::Query(format!("{} matching query does not exist", query.target)))
            }
            "count" => {
                let count = self
                    .tables
                    .get(&key)
                    .map(|rows| rows.iter().filter(|row| matches(row, &query.kwargs)).count())
                    .unwrap_or(0);
                Ok(Cursor::Value(Value::from(count)))
            }
            "create" => {
                let row = Value::Object(query.kwargs.clone());
                self.tables.entry(key).or_default().push(row.clone());
                Ok(Cursor::Value(row))
            }
            "update" => {
                let filter = object_kwarg(query, "filter")?;
                let values = object_kwarg(query, "values")?;
                let mut rows = self.tables.entry(key).or_default();
                let mut updated = 0usize;
                for row in rows.iter_mut().filter(|row| matches(row, &filter)) {
                    if let Value::Object(fields) = row {
                        for (k, v) in &values {
                            fields.insert(k.clone(), v.clone());
                        }
                        updated += 1;
                    }
                }
                Ok(Cursor::Value(Value::from(updated)))
            }
            "delete" => {
                let mut rows = self.tables.entry(key).or_default();
                let before = rows.len();
                rows.retain(|row| !matches(row, &query.kwargs));
                Ok(Cursor::Value(Value::from(before - rows.len())))
            }
            other => Err(DriverError::Query(format!("unknown operation: {}", other))),
        }
    }
}

impl Driver for MemoryDriver {
    fn execute<'a>(
        &'a self,
        connection: &'a Connection,
        query: &'a Query,
    ) -> BoxFuture<'a, Result<Cursor, DriverError>> {
        async move {
            self.enter(connection).await?;
            *self.executed.entry(connection.name.clone()).or_insert(0) += 1;
            self.run(connection, query)
        }
        .boxed()
    }

    fn probe<'a>(
        &'a self,
        connection: &'a Connection,
        _operation: &'a str,
    ) -> BoxFuture<'a, Result<f64, DriverError>> {
        async move {
            self.enter(connection).await?;
            Ok(self.loads.get(&connection.name).map(|l| *l).unwrap_or(0.0))
        }
        .boxed()
    }
}

/// A row matches when every filter field is present and equal.
fn matches(row: &Value, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}

fn object_kwarg(query: &Query, name: &str) -> Result<Map<String, Value>, DriverError> {
    match query.kwargs.get(name) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(DriverError::Query(format!("`{}` must be an object", name))),
        None => Ok(Map::new()),
    }
}
