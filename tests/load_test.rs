//! Concurrent load through the replica balancer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use replica_balancer::load_balancer::PrimaryOnly;
use replica_balancer::{BalancerError, BalancerOptions, Query};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_get_their_own_rows() {
    let (driver, lb) = common::start(
        4,
        common::patient_round_robin(),
        Arc::new(PrimaryOnly::new()),
        BalancerOptions::default(),
    );
    let rows: Vec<Value> = (0..200).map(|i| json!({"id": i, "owner": i})).collect();
    for db in ["db0", "db1", "db2", "db3"] {
        driver.seed(db, "rows", rows.clone());
        driver.set_latency(db, Duration::from_millis(1));
    }
    let lb = Arc::new(lb);

    let concurrency = 8;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;
    let start = Instant::now();

    let mut tasks = Vec::new();
    for task in 0..concurrency {
        let lb = lb.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            let mut exhausted = 0;
            for n in 0..requests_per_task {
                let id = task * requests_per_task + n;
                let req_start = Instant::now();
                match lb.submit(Query::scalar("rows", "get").kwarg("id", id)).await {
                    Ok(out) => {
                        // Every caller must see the row it asked for, never a neighbour's.
                        assert_eq!(out.value().unwrap()["owner"], json!(id));
                        latencies.push(req_start.elapsed());
                    }
                    Err(BalancerError::RoutingExhausted { .. }) => exhausted += 1,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            (latencies, exhausted)
        }));
    }

    let mut all_latencies = Vec::new();
    let mut exhausted = 0;
    for task in tasks {
        let (latencies, n) = task.await.unwrap();
        all_latencies.extend(latencies);
        exhausted += n;
    }

    let duration = start.elapsed();
    if all_latencies.is_empty() {
        panic!("No successful requests recorded");
    }

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("Exhausted:      {}", exhausted);
    println!("Success Rate:   {}/{}", all_latencies.len(), total_requests);
    println!("-------------------------\n");

    assert_eq!(lb.stale_completions(), 0);
    assert_eq!(lb.in_flight(), 0);
    lb.shutdown().await;
}
