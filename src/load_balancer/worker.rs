//! Per-database worker loop.
//!
//! # States
//! ```text
//! Idle → Executing: a dispatch permit is acquired, one query popped (FIFO)
//! Executing → Idle: the executor picked by `is_probe` finishes
//! ```
//! The loop runs until shutdown is signalled or the database is closed.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::load_balancer::database::Database;
use crate::query::Executor;

/// Executors shared by every worker.
#[derive(Clone)]
pub struct Executors {
    pub queries: Arc<dyn Executor>,
    pub telemetry: Arc<dyn Executor>,
}

/// Consume `database`'s queue until shutdown.
pub async fn run(
    database: Arc<Database>,
    executors: Executors,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::debug!(database = %database.name(), "Worker starting");

    loop {
        tokio::select! {
            next = database.next() => {
                let Some(query) = next else {
                    tracing::debug!(database = %database.name(), "Dispatch closed, worker exiting");
                    break;
                };
                let executor = if query.is_probe() {
                    &executors.telemetry
                } else {
                    &executors.queries
                };
                executor.run(query, &database).await;
            }
            _ = shutdown.recv() => {
                tracing::debug!(database = %database.name(), "Worker received shutdown signal");
                break;
            }
        }
    }
}
