//! Error types surfaced by the balancer.

use std::time::Duration;
use thiserror::Error;

use crate::driver::DriverError;
use crate::query::CorrelationId;

/// Errors returned from [`LoadBalancer::submit`](crate::LoadBalancer::submit).
#[derive(Debug, Error)]
pub enum BalancerError {
    /// No eligible replica was found within the bounded retry window.
    #[error("no eligible database after {attempts} attempts across {databases} databases")]
    RoutingExhausted { attempts: u32, databases: usize },

    /// The chosen replica is down or became unreachable while executing.
    #[error("database {database} unavailable: {reason}")]
    ReplicaUnavailable { database: String, reason: String },

    /// The caller gave up waiting for the result.
    #[error("query {correlation_id} timed out after {timeout:?}")]
    SubmitTimeout {
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// The driver rejected the query.
    #[error("database {database}: {source}")]
    Driver {
        database: String,
        #[source]
        source: DriverError,
    },

    /// The driver result could not be serialized.
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    /// The worker loops were stopped before the query completed.
    #[error("load balancer is shutting down")]
    Shutdown,
}

impl BalancerError {
    /// True when the failure means the replica could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BalancerError::ReplicaUnavailable { .. })
    }
}
