//! Query executors.
//!
//! Both executors run inside a database's worker loop, never on the
//! caller's task.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::config::HealthConfig;
use crate::driver::{Driver, DriverError};
use crate::error::BalancerError;
use crate::load_balancer::completion::CompletionTable;
use crate::load_balancer::database::Database;
use crate::observability::metrics;
use crate::query::{OperationKind, Query, QueryOutput, QueryResult};

/// Runs one query against one database and reports the outcome.
pub trait Executor: Send + Sync {
    fn run<'a>(&'a self, query: Query, database: &'a Database) -> BoxFuture<'a, ()>;
}

/// Thresholds for health tracking driven by executor outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassiveHealth {
    pub healthy_threshold: usize,
    pub unhealthy_threshold: usize,
}

impl PassiveHealth {
    pub fn from_config(config: &HealthConfig) -> Option<Self> {
        config.passive.then(|| Self {
            healthy_threshold: config.healthy_threshold.max(1) as usize,
            unhealthy_threshold: config.unhealthy_threshold.max(1) as usize,
        })
    }

    fn observe(&self, database: &Database, reachable: bool) {
        if reachable {
            database.record_success(self.healthy_threshold);
        } else {
            database.record_unreachable(self.unhealthy_threshold);
        }
    }
}

/// Executes application queries and completes the waiting call.
pub struct QueryExecutor {
    driver: Arc<dyn Driver>,
    completions: Arc<CompletionTable>,
    health: Option<PassiveHealth>,
}

impl QueryExecutor {
    pub fn new(
        driver: Arc<dyn Driver>,
        completions: Arc<CompletionTable>,
        health: Option<PassiveHealth>,
    ) -> Self {
        Self {
            driver,
            completions,
            health,
        }
    }

    /// Run `query` on `database` and serialize the result.
    pub async fn execute(&self, query: &Query, database: &Database) -> QueryResult {
        let value = self
            .driver
            .execute(database.connection(), query)
            .await
            .and_then(|cursor| match query.kind {
                OperationKind::Collection => cursor.materialize(),
                OperationKind::Scalar => cursor.into_scalar(),
            });

        let reachable = !matches!(value, Err(DriverError::Unreachable { .. }));
        if let Some(health) = &self.health {
            health.observe(database, reachable);
        }
        metrics::record_query(database.name(), query.intent, value.is_ok());

        match value {
            Ok(value) => QueryOutput::encode(query.correlation_id(), database.name(), &value),
            Err(DriverError::Unreachable { reason, .. }) => {
                tracing::warn!(
                    database = %database.name(),
                    correlation_id = query.correlation_id(),
                    reason = %reason,
                    "Database unreachable during execution"
                );
                Err(BalancerError::ReplicaUnavailable {
                    database: database.name().to_string(),
                    reason,
                })
            }
            Err(source) => {
                tracing::debug!(
                    database = %database.name(),
                    correlation_id = query.correlation_id(),
                    error = %source,
                    "Query failed"
                );
                Err(BalancerError::Driver {
                    database: database.name().to_string(),
                    source,
                })
            }
        }
    }
}

impl Executor for QueryExecutor {
    fn run<'a>(&'a self, query: Query, database: &'a Database) -> BoxFuture<'a, ()> {
        async move {
            let result = self.execute(&query, database).await;
            let result = match query.fanout() {
                Some(group) => match group.record(database.index(), result) {
                    Some(canonical) => canonical,
                    // Other replicas of the fan-out are still running.
                    None => return,
                },
                None => result,
            };
            self.completions.complete(query.correlation_id(), result);
        }
        .boxed()
    }
}

/// Runs load probes and stores the result in the telemetry slot.
pub struct TelemetryExecutor {
    driver: Arc<dyn Driver>,
    health: Option<PassiveHealth>,
}

impl TelemetryExecutor {
    pub fn new(driver: Arc<dyn Driver>, health: Option<PassiveHealth>) -> Self {
        Self { driver, health }
    }
}

impl Executor for TelemetryExecutor {
    fn run<'a>(&'a self, query: Query, database: &'a Database) -> BoxFuture<'a, ()> {
        async move {
            match self.driver.probe(database.connection(), &query.operation).await {
                Ok(load) => {
                    database.report_telemetry(load);
                    if let Some(health) = &self.health {
                        health.observe(database, true);
                    }
                }
                Err(e) => {
                    tracing::warn!(database = %database.name(), error = %e, "Load probe failed");
                    metrics::record_probe_failure(database.name());
                    if let Some(health) = &self.health {
                        health.observe(database, !matches!(e, DriverError::Unreachable { .. }));
                    }
                }
            }
        }
        .boxed()
    }
}
