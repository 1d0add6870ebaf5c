//! Interval read selection.
//!
//! Databases are ranked by a load estimate that a background refresh
//! loop keeps current: each cycle copies the probe result left in every
//! telemetry slot into the estimate table, then queues a fresh probe.
//! The ranking therefore trails the probes by one cycle.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::{BoxFuture, FutureExt};

use crate::config::ReadConfig;
use crate::error::BalancerError;
use crate::load_balancer::database::Database;
use crate::load_balancer::{select_with_retry, ReadAlgorithm};
use crate::observability::metrics;
use crate::query::Query;
use crate::resilience::RetryPolicy;

/// Estimate used for databases that have not reported a load yet.
pub const NEUTRAL_LOAD: f64 = 0.0;

/// Lowest-load-first read selector.
#[derive(Debug)]
pub struct Interval {
    /// Load estimate per database index.
    estimates: ArcSwap<Vec<f64>>,
    interval: Duration,
    probe_operation: String,
    policy: RetryPolicy,
}

impl Interval {
    pub fn new(interval: Duration, probe_operation: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            estimates: ArcSwap::from_pointee(Vec::new()),
            interval,
            probe_operation: probe_operation.into(),
            policy,
        }
    }

    pub fn from_config(config: &ReadConfig) -> Self {
        Self::new(
            Duration::from_millis(config.refresh_interval_ms),
            config.probe_operation.clone(),
            RetryPolicy::from(config),
        )
    }

    /// Seed the estimates, indexed by database position.
    pub fn with_loads(self, loads: Vec<f64>) -> Self {
        self.estimates.store(Arc::new(loads));
        self
    }

    pub fn load_estimate(&self, index: usize) -> f64 {
        self.estimates
            .load()
            .get(index)
            .copied()
            .unwrap_or(NEUTRAL_LOAD)
    }

    pub fn set_load(&self, index: usize, load: f64) {
        self.estimates.rcu(|current| {
            let mut next = (**current).clone();
            if next.len() <= index {
                next.resize(index + 1, NEUTRAL_LOAD);
            }
            next[index] = load;
            next
        });
    }

    /// Database indices, lowest estimate first; ties keep registration order.
    pub fn ranking(&self, count: usize) -> Vec<usize> {
        let estimates = self.estimates.load();
        let load = |i: usize| estimates.get(i).copied().unwrap_or(NEUTRAL_LOAD);
        let mut order: Vec<usize> = (0..count).collect();
        order.sort_by(|&a, &b| load(a).total_cmp(&load(b)));
        order
    }

    /// One pass over the ranking, claiming the first eligible database.
    fn pass(&self, databases: &[Arc<Database>], mut query: Query) -> Result<usize, Query> {
        let correlation_id = query.correlation_id();
        for index in self.ranking(databases.len()) {
            let db = &databases[index];
            if !db.is_up() {
                continue;
            }
            match db.try_enqueue_idle(query) {
                Ok(()) => {
                    tracing::debug!(
                        database = %db.name(),
                        load = self.load_estimate(index),
                        correlation_id,
                        "Read routed"
                    );
                    return Ok(index);
                }
                Err(returned) => query = returned,
            }
        }
        Err(query)
    }

    /// Copy fresh telemetry into the estimates and queue a new probe on
    /// every database.
    ///
    /// A database that still holds an unconsumed probe is not given a
    /// second one.
    pub fn refresh_cycle(&self, databases: &[Arc<Database>]) {
        let mut fresh = Vec::new();
        for db in databases {
            if let Some(load) = db.take_telemetry() {
                metrics::record_load_estimate(db.name(), load);
                fresh.push((db.index(), load));
            }
        }

        self.estimates.rcu(|current| {
            let mut next = (**current).clone();
            if next.len() < databases.len() {
                next.resize(databases.len(), NEUTRAL_LOAD);
            }
            for &(index, load) in &fresh {
                next[index] = load;
            }
            next
        });

        for db in databases {
            if db.has_pending_probe() {
                tracing::debug!(database = %db.name(), "Previous probe still pending");
                continue;
            }
            if db.enqueue(Query::probe(&self.probe_operation)).is_err() {
                tracing::debug!(database = %db.name(), "Database closed, probe skipped");
            }
        }
    }
}

impl ReadAlgorithm for Interval {
    fn select_for_read<'a>(
        &'a self,
        databases: &'a [Arc<Database>],
        query: Query,
    ) -> BoxFuture<'a, Result<usize, BalancerError>> {
        async move {
            select_with_retry(&self.policy, databases.len(), query, |q| {
                self.pass(databases, q)
            })
            .await
        }
        .boxed()
    }

    fn refresh_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn refresh(&self, databases: &[Arc<Database>]) {
        self.refresh_cycle(databases);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use crate::load_balancer::database::tests::databases;
    use std::time::Instant;

    fn interval(loads: Vec<f64>) -> Interval {
        Interval::new(Duration::from_secs(1), "load", RetryPolicy::default()).with_loads(loads)
    }

    #[test]
    fn test_ranking_is_stable() {
        let alg = interval(vec![3.0, 1.0, 3.0, 0.5]);
        assert_eq!(alg.ranking(4), vec![3, 1, 0, 2]);
        // Unknown databases rank as neutral.
        assert_eq!(alg.ranking(5), vec![4, 3, 1, 0, 2]);
    }

    #[tokio::test]
    async fn test_selects_lowest_load() {
        let dbs = databases(3);
        let alg = interval(vec![5.0, 1.0, 3.0]);
        let chosen = alg.select_for_read(&dbs, Query::select("users", "all")).await.unwrap();
        assert_eq!(chosen, 1);
        assert_eq!(dbs[1].queue_len(), 1);
    }

    #[tokio::test]
    async fn test_skips_down_database() {
        let dbs = databases(3);
        dbs[1].report_health(HealthState::Down);
        let alg = interval(vec![5.0, 1.0, 3.0]);
        let chosen = alg.select_for_read(&dbs, Query::select("users", "all")).await.unwrap();
        assert_eq!(chosen, 2);
    }

    #[tokio::test]
    async fn test_skips_busy_database() {
        let dbs = databases(3);
        let alg = interval(vec![5.0, 1.0, 3.0]);
        dbs[1].enqueue(Query::select("users", "all")).unwrap();
        dbs[2].enqueue(Query::select("users", "all")).unwrap();
        let chosen = alg.select_for_read(&dbs, Query::select("users", "all")).await.unwrap();
        assert_eq!(chosen, 0);
        assert_eq!(dbs[1].queue_len(), 1);
        assert_eq!(dbs[2].queue_len(), 1);
    }

    #[tokio::test]
    async fn test_all_down_terminates_quickly() {
        let dbs = databases(3);
        for db in &dbs {
            db.report_health(HealthState::Down);
        }
        let alg = interval(vec![5.0, 1.0, 3.0]);

        let started = Instant::now();
        let err = alg.select_for_read(&dbs, Query::select("users", "all")).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(matches!(
            err,
            BalancerError::RoutingExhausted { attempts: 4, databases: 3 }
        ));
        assert!(dbs.iter().all(|db| db.is_idle()));
    }

    #[tokio::test]
    async fn test_all_busy_terminates() {
        let dbs = databases(2);
        for db in &dbs {
            db.enqueue(Query::select("users", "all")).unwrap();
        }
        let alg = interval(vec![]);
        let err = alg.select_for_read(&dbs, Query::select("users", "all")).await.unwrap_err();
        assert!(matches!(err, BalancerError::RoutingExhausted { .. }));
    }

    #[test]
    fn test_refresh_queues_one_probe_per_database() {
        let dbs = databases(2);
        let alg = interval(vec![]);

        alg.refresh_cycle(&dbs);
        for db in &dbs {
            let pending = db.pending();
            assert_eq!(pending.len(), 1);
            assert!(pending[0].is_probe());
            assert_eq!(pending[0].operation, "load");
        }

        // No pile-up while the first probe is unconsumed.
        alg.refresh_cycle(&dbs);
        assert!(dbs.iter().all(|db| db.queue_len() == 1));
    }

    #[test]
    fn test_refresh_copies_fresh_telemetry() {
        let dbs = databases(3);
        let alg = interval(vec![]);
        dbs[0].report_telemetry(5.0);
        dbs[2].report_telemetry(3.0);

        alg.refresh_cycle(&dbs);
        assert_eq!(alg.load_estimate(0), 5.0);
        assert_eq!(alg.load_estimate(1), NEUTRAL_LOAD);
        assert_eq!(alg.load_estimate(2), 3.0);
        assert_eq!(alg.ranking(3), vec![1, 2, 0]);

        // Consumed values are not copied twice; estimates persist.
        dbs[0].report_telemetry(0.5);
        alg.refresh_cycle(&dbs);
        assert_eq!(alg.load_estimate(0), 0.5);
        assert_eq!(alg.load_estimate(2), 3.0);
    }

    #[test]
    fn test_refresh_keeps_concurrent_set_load() {
        let dbs = databases(3);
        let alg = Arc::new(interval(vec![]));

        let writer = {
            let alg = alg.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    alg.set_load(3, i as f64);
                }
            })
        };
        for i in 0..1000 {
            dbs[i % 3].report_telemetry(1.0);
            alg.refresh_cycle(&dbs);
        }
        writer.join().unwrap();

        assert_eq!(alg.load_estimate(3), 999.0);
        assert!(dbs.iter().all(|db| db.queue_len() == 1));
    }

    #[test]
    fn test_set_load_grows_table() {
        let alg = interval(vec![]);
        alg.set_load(2, 4.0);
        assert_eq!(alg.load_estimate(0), NEUTRAL_LOAD);
        assert_eq!(alg.load_estimate(2), 4.0);
    }
}
