//! Database abstraction.
//!
//! # Responsibilities
//! - Represent a single physical database (replica or primary)
//! - Own the FIFO of pending queries and its dispatch semaphore
//! - Track health state (Up/Down)
//! - Hold the latest load metric produced by probe queries

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Semaphore;
use url::Url;

use crate::config::{DatabaseConfig, DatabaseRole, ValidationError};
use crate::driver::Connection;
use crate::health::{HealthState, HealthTracker};
use crate::observability::metrics;
use crate::query::Query;

/// A single physical database managed by the balancer.
///
/// Every push onto the pending queue releases exactly one dispatch permit,
/// so the number of permits equals the queue length at rest.
#[derive(Debug)]
pub struct Database {
    /// Position in the balancer's database table.
    index: usize,
    name: String,
    role: DatabaseRole,
    connection: Connection,
    health: HealthTracker,
    pending: Mutex<VecDeque<Query>>,
    dispatch: Semaphore,
    /// Most recent unconsumed probe result.
    telemetry: Mutex<Option<f64>>,
}

impl Database {
    /// Create a database handle.
    pub fn new(index: usize, name: impl Into<String>, role: DatabaseRole, url: Url) -> Self {
        let name = name.into();
        Self {
            index,
            connection: Connection::new(name.clone(), url),
            name,
            role,
            health: HealthTracker::new(HealthState::Up),
            pending: Mutex::new(VecDeque::new()),
            dispatch: Semaphore::new(0),
            telemetry: Mutex::new(None),
        }
    }

    /// Create a database handle from its configuration entry.
    pub fn from_config(index: usize, config: &DatabaseConfig) -> Result<Self, ValidationError> {
        let url = Url::parse(&config.url).map_err(|e| ValidationError::InvalidUrl {
            database: config.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(index, config.name.clone(), config.role, url))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> DatabaseRole {
        self.role
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    // --- Health ---

    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    pub fn is_up(&self) -> bool {
        self.health.is_up()
    }

    /// Set the health state (external connection monitor).
    pub fn report_health(&self, status: HealthState) {
        let previous = self.health.set(status);
        if previous != status {
            tracing::info!(database = %self.name, from = ?previous, to = ?status, "Database health reported");
        }
        metrics::record_database_health(&self.name, status == HealthState::Up);
    }

    /// Passive success observation.
    pub(crate) fn record_success(&self, healthy_threshold: usize) {
        if self.health.record_success(healthy_threshold) {
            tracing::info!(database = %self.name, "Database recovered, marking up");
            metrics::record_database_health(&self.name, true);
        }
    }

    /// Passive unreachable observation.
    pub(crate) fn record_unreachable(&self, unhealthy_threshold: usize) {
        if self.health.record_failure(unhealthy_threshold) {
            tracing::warn!(database = %self.name, "Database unreachable, marking down");
            metrics::record_database_health(&self.name, false);
        }
    }

    // --- Telemetry ---

    /// Store a fresh load metric, replacing any unconsumed one.
    pub fn report_telemetry(&self, value: f64) {
        *self.telemetry.lock().expect("telemetry mutex poisoned") = Some(value);
    }

    /// Consume the fresh load metric, if any.
    pub fn take_telemetry(&self) -> Option<f64> {
        self.telemetry.lock().expect("telemetry mutex poisoned").take()
    }

    // --- Queue ---

    /// Push a query and release one dispatch permit.
    ///
    /// Hands the query back once the database is closed.
    pub(crate) fn enqueue(&self, query: Query) -> Result<(), Query> {
        let depth = {
            let mut pending = self.pending.lock().expect("queue mutex poisoned");
            if self.dispatch.is_closed() {
                return Err(query);
            }
            pending.push_back(query);
            pending.len()
        };
        self.dispatch.add_permits(1);
        metrics::record_queue_depth(&self.name, depth);
        Ok(())
    }

    /// Push a query only if nothing is waiting on this database.
    ///
    /// The emptiness check and the push happen under one lock, so two
    /// concurrent readers can never both claim the same idle database.
    /// Refused once the database is closed.
    pub(crate) fn try_enqueue_idle(&self, query: Query) -> Result<(), Query> {
        {
            let mut pending = self.pending.lock().expect("queue mutex poisoned");
            if self.dispatch.is_closed() || !pending.is_empty() {
                return Err(query);
            }
            pending.push_back(query);
        }
        self.dispatch.add_permits(1);
        metrics::record_queue_depth(&self.name, 1);
        Ok(())
    }

    /// Wait for a dispatch permit and pop the oldest query.
    /// Returns `None` once the semaphore is closed.
    pub(crate) async fn next(&self) -> Option<Query> {
        loop {
            let permit = self.dispatch.acquire().await.ok()?;
            permit.forget();

            let (query, depth) = {
                let mut pending = self.pending.lock().expect("queue mutex poisoned");
                let query = pending.pop_front();
                (query, pending.len())
            };
            match query {
                Some(query) => {
                    metrics::record_queue_depth(&self.name, depth);
                    return Some(query);
                }
                None => {
                    tracing::error!(database = %self.name, "Dispatch permit without a pending query");
                }
            }
        }
    }

    /// Stop the worker loop and drop every pending query.
    pub(crate) fn close(&self) {
        let dropped = {
            let mut pending = self.pending.lock().expect("queue mutex poisoned");
            self.dispatch.close();
            let dropped = pending.len();
            pending.clear();
            dropped
        };
        if dropped > 0 {
            tracing::debug!(database = %self.name, dropped, "Dropped pending queries on close");
        }
        metrics::record_queue_depth(&self.name, 0);
    }

    pub fn is_closed(&self) -> bool {
        self.dispatch.is_closed()
    }

    pub fn queue_len(&self) -> usize {
        self.pending.lock().expect("queue mutex poisoned").len()
    }

    /// True when no query is waiting on this database.
    pub fn is_idle(&self) -> bool {
        self.queue_len() == 0
    }

    pub fn has_pending_probe(&self) -> bool {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .iter()
            .any(|q| q.is_probe())
    }

    /// Snapshot of the pending queue, oldest first.
    pub fn pending(&self) -> Vec<Query> {
        self.pending
            .lock()
            .expect("queue mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Available dispatch permits; equals `queue_len` while no worker is mid-pop.
    pub fn dispatch_permits(&self) -> usize {
        self.dispatch.available_permits()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn databases(count: usize) -> Vec<Arc<Database>> {
        (0..count)
            .map(|i| {
                let url = format!("memory://db{}", i).parse().unwrap();
                Arc::new(Database::new(i, format!("db{}", i), DatabaseRole::Replica, url))
            })
            .collect()
    }

    #[test]
    fn test_enqueue_keeps_permits_in_step() {
        let db = &databases(1)[0];
        db.enqueue(Query::select("users", "all")).unwrap();
        db.enqueue(Query::probe("load")).unwrap();
        assert_eq!(db.queue_len(), 2);
        assert_eq!(db.dispatch_permits(), 2);
        assert!(db.has_pending_probe());
    }

    #[test]
    fn test_try_enqueue_idle_rejects_busy() {
        let db = &databases(1)[0];
        assert!(db.try_enqueue_idle(Query::select("users", "all")).is_ok());
        let rejected = db.try_enqueue_idle(Query::scalar("users", "count")).unwrap_err();
        assert_eq!(rejected.operation, "count");
        assert_eq!(db.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_next_is_fifo() {
        let db = &databases(1)[0];
        db.enqueue(Query::select("a", "all")).unwrap();
        db.enqueue(Query::select("b", "all")).unwrap();

        assert_eq!(db.next().await.unwrap().target, "a");
        assert_eq!(db.next().await.unwrap().target, "b");
        assert_eq!(db.dispatch_permits(), 0);
    }

    #[tokio::test]
    async fn test_next_blocks_until_enqueue() {
        let db = databases(1).remove(0);
        let waiter = {
            let db = db.clone();
            tokio::spawn(async move { db.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        db.enqueue(Query::select("users", "all")).unwrap();
        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.target, "users");
    }

    #[tokio::test]
    async fn test_close_releases_worker() {
        let db = &databases(1)[0];
        db.close();
        assert!(db.next().await.is_none());
    }

    #[test]
    fn test_closed_database_refuses_work() {
        let db = &databases(1)[0];
        db.enqueue(Query::select("users", "all")).unwrap();
        db.close();

        assert!(db.is_closed());
        assert!(db.is_idle());
        let rejected = db.enqueue(Query::scalar("users", "count")).unwrap_err();
        assert_eq!(rejected.operation, "count");
        assert!(db.try_enqueue_idle(Query::select("users", "all")).is_err());
        assert_eq!(db.queue_len(), 0);
    }

    #[test]
    fn test_telemetry_slot_is_consumed() {
        let db = &databases(1)[0];
        assert_eq!(db.take_telemetry(), None);
        db.report_telemetry(2.0);
        db.report_telemetry(3.0);
        assert_eq!(db.take_telemetry(), Some(3.0));
        assert_eq!(db.take_telemetry(), None);
    }

    #[test]
    fn test_report_health() {
        let db = &databases(1)[0];
        db.report_health(HealthState::Down);
        assert!(!db.is_up());
        db.record_success(1);
        assert!(db.is_up());
    }
}
