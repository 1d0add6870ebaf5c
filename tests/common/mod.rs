//! Shared utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use replica_balancer::config::DatabaseConfig;
use replica_balancer::load_balancer::{Interval, RoundRobin};
use replica_balancer::resilience::RetryPolicy;
use replica_balancer::{configure, BalancerOptions, LoadBalancer, MemoryDriver, MutationAlgorithm, ReadAlgorithm};

/// `count` in-memory databases named db0.., db0 being the primary.
pub fn memory_databases(count: usize) -> Vec<DatabaseConfig> {
    (0..count)
        .map(|i| {
            let name = format!("db{}", i);
            let url = format!("memory://{}", name);
            if i == 0 {
                DatabaseConfig::primary(name, url)
            } else {
                DatabaseConfig::new(name, url)
            }
        })
        .collect()
}

/// Interval selector with seeded loads and a refresh period long enough
/// that only the initial probe cycle runs during a test.
#[allow(dead_code)]
pub fn seeded_interval(loads: Vec<f64>) -> Arc<dyn ReadAlgorithm> {
    Arc::new(Interval::new(Duration::from_secs(3600), "load", RetryPolicy::default()).with_loads(loads))
}

/// Round-robin selector with a patient retry schedule.
#[allow(dead_code)]
pub fn patient_round_robin() -> Arc<dyn ReadAlgorithm> {
    Arc::new(RoundRobin::new(RetryPolicy::new(
        50,
        Duration::from_millis(1),
        Duration::from_millis(5),
    )))
}

/// Start a balancer over `count` in-memory databases.
pub fn start(
    count: usize,
    read: Arc<dyn ReadAlgorithm>,
    mutation: Arc<dyn MutationAlgorithm>,
    options: BalancerOptions,
) -> (Arc<MemoryDriver>, LoadBalancer) {
    let driver = Arc::new(MemoryDriver::new());
    let balancer = start_on(driver.clone(), count, read, mutation, options);
    (driver, balancer)
}

/// Start a balancer on a driver prepared before the first refresh cycle.
pub fn start_on(
    driver: Arc<MemoryDriver>,
    count: usize,
    read: Arc<dyn ReadAlgorithm>,
    mutation: Arc<dyn MutationAlgorithm>,
    options: BalancerOptions,
) -> LoadBalancer {
    configure(memory_databases(count), read, mutation, driver, options).expect("valid topology")
}
