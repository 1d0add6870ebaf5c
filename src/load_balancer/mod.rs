//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! LoadBalancer::submit(query)
//!     → completion.rs (assign correlation id, open mailbox)
//!     → intent READ:   ReadAlgorithm::select_for_read
//!         - interval.rs (lowest load estimate first)
//!         - round_robin.rs (rotate through databases)
//!     → intent MUTATE: MutationAlgorithm::select_for_mutation (mutation.rs)
//!     → database.rs (enqueue + release dispatch permit)
//!     → worker.rs (pop, run executor, complete)
//!     → completion.rs (deliver to the mailbox of that id only)
//!
//! refresh.rs (background):
//!     timer → ReadAlgorithm::refresh → probe queries on every database
//! ```
//!
//! # Design Decisions
//! - The balancer exclusively owns the databases; algorithms borrow them
//! - Databases refer back to the balancer by table index, not by pointer
//! - Down databases and databases with unconsumed work are skipped for reads
//! - Every selection loop is bounded and ends in RoutingExhausted

pub mod balancer;
pub mod completion;
pub mod database;
pub mod interval;
pub mod mutation;
pub mod refresh;
pub mod round_robin;
pub mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::BalancerError;
use crate::observability::metrics;
use crate::query::Query;
use crate::resilience::RetryPolicy;
use database::Database;

pub use balancer::{configure, BalancerOptions, LoadBalancer};
pub use completion::CompletionTable;
pub use interval::Interval;
pub use mutation::{AllReplicas, PrimaryOnly};
pub use round_robin::RoundRobin;

/// Chooses the database that serves a read.
pub trait ReadAlgorithm: Send + Sync + fmt::Debug {
    /// Enqueue `query` on one eligible database and return its index.
    fn select_for_read<'a>(
        &'a self,
        databases: &'a [Arc<Database>],
        query: Query,
    ) -> BoxFuture<'a, Result<usize, BalancerError>>;

    /// Period of the background refresh loop, if the algorithm needs one.
    fn refresh_interval(&self) -> Option<Duration> {
        None
    }

    /// One refresh cycle.
    fn refresh(&self, _databases: &[Arc<Database>]) {}
}

/// Chooses the database(s) that apply a mutation.
pub trait MutationAlgorithm: Send + Sync + fmt::Debug {
    /// Enqueue `query` on every required database and return their indices.
    ///
    /// The waiting call is completed exactly once, however many databases
    /// were targeted.
    fn select_for_mutation(
        &self,
        databases: &[Arc<Database>],
        query: Query,
    ) -> Result<Vec<usize>, BalancerError>;

    /// Plain statement of what a read issued after this write observes.
    fn consistency(&self) -> &'static str;
}

/// Run `pass` up to `policy.max_attempts` times with backoff in between.
///
/// `pass` either claims a database for the query or hands it back.
pub(crate) async fn select_with_retry<F>(
    policy: &RetryPolicy,
    databases: usize,
    mut query: Query,
    mut pass: F,
) -> Result<usize, BalancerError>
where
    F: FnMut(Query) -> Result<usize, Query>,
{
    for attempt in 0..policy.max_attempts {
        let delay = policy.delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match pass(query) {
            Ok(index) => return Ok(index),
            Err(returned) => query = returned,
        }
        tracing::debug!(
            attempt = attempt + 1,
            correlation_id = query.correlation_id(),
            "No eligible database for read"
        );
    }

    tracing::warn!(
        attempts = policy.max_attempts,
        databases,
        correlation_id = query.correlation_id(),
        "Read routing exhausted"
    );
    metrics::record_routing_exhausted();
    Err(BalancerError::RoutingExhausted {
        attempts: policy.max_attempts,
        databases,
    })
}
