//! Ownership of the background tasks spawned by a balancer.

use std::future::Future;
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Spawns long-running loops and stops them together.
///
/// Every loop subscribes to one broadcast channel; triggering it, or
/// dropping the supervisor, ends them all.
#[derive(Debug)]
pub struct Supervisor {
    runtime: Handle,
    tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    /// Create a supervisor spawning onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            runtime,
            tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the stop signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Spawn a supervised task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(task);
        self.tasks.lock().expect("supervisor mutex poisoned").push(handle);
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Number of supervised tasks that have not finished.
    pub fn running(&self) -> usize {
        self.tasks
            .lock()
            .expect("supervisor mutex poisoned")
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(());
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .expect("supervisor mutex poisoned")
            .drain(..)
            .collect();

        let count = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Supervised task failed");
            }
        }
        tracing::info!(tasks = count, "All background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_stops_subscribers() {
        let supervisor = Supervisor::new(Handle::current());
        for _ in 0..3 {
            let mut rx = supervisor.subscribe();
            supervisor.spawn(async move {
                let _ = rx.recv().await;
            });
        }
        assert_eq!(supervisor.running(), 3);

        supervisor.shutdown().await;
        assert_eq!(supervisor.running(), 0);
    }
}
