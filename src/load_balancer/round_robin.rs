//! Round-robin read selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::config::ReadConfig;
use crate::error::BalancerError;
use crate::load_balancer::database::Database;
use crate::load_balancer::{select_with_retry, ReadAlgorithm};
use crate::query::Query;
use crate::resilience::RetryPolicy;

/// Round-robin selector.
/// Stores an internal counter to rotate the starting database; down and
/// busy databases are skipped the same way as in interval selection.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
    policy: RetryPolicy,
}

impl RoundRobin {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            policy,
        }
    }

    pub fn from_config(config: &ReadConfig) -> Self {
        Self::new(RetryPolicy::from(config))
    }

    fn pass(&self, databases: &[Arc<Database>], mut query: Query) -> Result<usize, Query> {
        if databases.is_empty() {
            return Err(query);
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = databases.len();

        for i in 0..len {
            let index = (start + i) % len;
            let db = &databases[index];
            if !db.is_up() {
                continue;
            }
            match db.try_enqueue_idle(query) {
                Ok(()) => return Ok(index),
                Err(returned) => query = returned,
            }
        }
        Err(query)
    }
}

impl ReadAlgorithm for RoundRobin {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use crate::load_balancer::database::tests::databases;

    async fn drain(dbs: &[Arc<Database>]) {
        for db in dbs {
            while !db.is_idle() {
                db.next().await;
            }
        }
    }

    #[tokio::test]
    async fn test_round_robin() {
        let lb = RoundRobin::default();
        let dbs = databases(2);

        let s1 = lb.select_for_read(&dbs, Query::select("t", "all")).await.unwrap();
        assert_eq!(s1, 0);
        drain(&dbs).await;

        let s2 = lb.select_for_read(&dbs, Query::select("t", "all")).await.unwrap();
        assert_eq!(s2, 1);
        drain(&dbs).await;

        let s3 = lb.select_for_read(&dbs, Query::select("t", "all")).await.unwrap();
        assert_eq!(s3, 0);
    }

    #[tokio::test]
    async fn test_round_robin_skips_down_and_busy() {
        let lb = RoundRobin::default();
        let dbs = databases(3);
        dbs[0].report_health(HealthState::Down);
        dbs[1].enqueue(Query::select("t", "all")).unwrap();

        let chosen = lb.select_for_read(&dbs, Query::select("t", "all")).await.unwrap();
        assert_eq!(chosen, 2);
    }

    #[tokio::test]
    async fn test_round_robin_exhausts() {
        let lb = RoundRobin::default();
        let dbs = databases(2);
        for db in &dbs {
            db.report_health(HealthState::Down);
        }
        let err = lb.select_for_read(&dbs, Query::select("t", "all")).await.unwrap_err();
        assert!(matches!(err, BalancerError::RoutingExhausted { .. }));
    }
}
