//! Background refresh loop for read algorithms.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::load_balancer::database::Database;
use crate::load_balancer::ReadAlgorithm;

/// Run `algorithm.refresh` every `interval` until shutdown.
/// The first cycle runs immediately.
pub async fn run(
    algorithm: Arc<dyn ReadAlgorithm>,
    databases: Arc<[Arc<Database>]>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(
        interval_ms = interval.as_millis() as u64,
        databases = databases.len(),
        "Load refresh loop starting"
    );

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                algorithm.refresh(&databases);
            }
            _ = shutdown.recv() => {
                tracing::info!("Load refresh loop received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::database::tests::databases;
    use crate::load_balancer::Interval;
    use crate::resilience::RetryPolicy;

    #[tokio::test]
    async fn test_first_cycle_queues_probes() {
        let dbs: Arc<[Arc<Database>]> = databases(2).into();
        let alg: Arc<dyn ReadAlgorithm> =
            Arc::new(Interval::new(Duration::from_secs(1), "load", RetryPolicy::default()));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(run(alg, dbs.clone(), Duration::from_secs(1), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        for db in dbs.iter() {
            let pending = db.pending();
            assert_eq!(pending.len(), 1);
            assert!(pending[0].is_probe());
        }

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
