//! Correlation-id mailbox.
//!
//! # Responsibilities
//! - Assign monotonically increasing correlation ids (wrapping at u64::MAX)
//! - Hold one one-shot mailbox per in-flight call
//! - Deliver a worker completion only to the call that registered its id
//! - Count and log completions that no caller is waiting for
//!
//! # Design Decisions
//! - Assignment and completion both go through the same table, so there
//!   is no window where a result can reach a different caller
//! - Per-call mailboxes allow overlapping `submit` calls
//! - Abandoned ids (timeouts, routing failures) turn late results stale
//! - Closing the table fails every waiting caller with `Shutdown` and
//!   refuses new registrations

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::BalancerError;
use crate::observability::metrics;
use crate::query::{CorrelationId, QueryResult};

/// Table of callers waiting for a completion.
#[derive(Debug, Default)]
pub struct CompletionTable {
    next_id: AtomicU64,
    waiting: DashMap<CorrelationId, oneshot::Sender<QueryResult>>,
    stale: AtomicU64,
    closed: AtomicBool,
}

impl CompletionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start assigning ids from `id`.
    pub fn starting_at(id: CorrelationId) -> Self {
        Self {
            next_id: AtomicU64::new(id),
            ..Self::default()
        }
    }

    /// Assign the next correlation id and open its mailbox.
    ///
    /// Fails with [`BalancerError::Shutdown`] once the table is closed.
    pub fn register(
        &self,
    ) -> Result<(CorrelationId, oneshot::Receiver<QueryResult>), BalancerError> {
        if self.is_closed() {
            return Err(BalancerError::Shutdown);
        }

        let (tx, rx) = oneshot::channel();
        // fetch_add wraps on overflow
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        if self.waiting.insert(id, tx).is_some() {
            tracing::error!(correlation_id = id, "Correlation id reused while still in flight");
        }

        // close() may have drained the table between the check and the insert.
        if self.is_closed() {
            self.waiting.remove(&id);
            return Err(BalancerError::Shutdown);
        }
        Ok((id, rx))
    }

    /// Deliver `result` to the caller waiting on `id`.
    ///
    /// Returns false, and leaves every other mailbox untouched, when no
    /// caller receives the result. That covers unknown, finished and
    /// abandoned ids as well as a caller whose receiver is already gone;
    /// all of them count as stale completions.
    pub fn complete(&self, id: CorrelationId, result: QueryResult) -> bool {
        let delivered = match self.waiting.remove(&id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => false,
        };
        if !delivered {
            self.stale.fetch_add(1, Ordering::Relaxed);
            metrics::record_stale_completion();
            tracing::warn!(
                correlation_id = id,
                next_correlation_id = self.next_correlation_id(),
                "Discarding stale completion"
            );
        }
        delivered
    }

    /// Refuse new registrations and fail every waiting caller with
    /// [`BalancerError::Shutdown`]. Returns how many callers were failed.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<CorrelationId> = self.waiting.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, tx)) = self.waiting.remove(&id) {
                if tx.send(Err(BalancerError::Shutdown)).is_ok() {
                    failed += 1;
                }
            }
        }
        failed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop waiting for `id`; a later completion for it is stale.
    pub fn abandon(&self, id: CorrelationId) -> bool {
        self.waiting.remove(&id).is_some()
    }

    /// The id the next registered call will receive.
    pub fn next_correlation_id(&self) -> CorrelationId {
        self.next_id.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_waiting(&self, id: CorrelationId) -> bool {
        self.waiting.contains_key(&id)
    }

    pub fn stale_completions(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }
}

/// Abandons a registered id when dropped, covering dropped callers.
///
/// Abandoning an id that already completed does nothing.
pub(crate) struct AbandonGuard<'a> {
    table: &'a CompletionTable,
    id: CorrelationId,
}

impl<'a> AbandonGuard<'a> {
    pub(crate) fn new(table: &'a CompletionTable, id: CorrelationId) -> Self {
        Self { table, id }
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        self.table.abandon(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryOutput;
    use tokio::sync::oneshot::error::TryRecvError;

    fn output(id: CorrelationId, db: &str) -> QueryResult {
        QueryOutput::encode(id, db, &serde_json::json!(id))
    }

    #[test]
    fn test_ids_are_monotonic() {
        let table = CompletionTable::new();
        let ids: Vec<_> = (0..100).map(|_| table.register().unwrap().0).collect();
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(table.next_correlation_id(), 100);
    }

    #[test]
    fn test_ids_wrap_at_max() {
        let table = CompletionTable::starting_at(u64::MAX);
        let (a, _) = table.register().unwrap();
        let (b, _) = table.register().unwrap();
        assert_eq!(a, u64::MAX);
        assert_eq!(b, 0);
    }

    #[test]
    fn test_complete_delivers_to_owner() {
        let table = CompletionTable::new();
        let (id, mut rx) = table.register().unwrap();
        assert!(table.complete(id, output(id, "db0")));
        let delivered = rx.try_recv().unwrap().unwrap();
        assert_eq!(delivered.correlation_id, id);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn test_stale_completion_leaves_mailbox_untouched() {
        let table = CompletionTable::new();
        let (previous, _rx) = table.register().unwrap();
        assert!(table.complete(previous, output(previous, "db0")));

        let (current, mut rx) = table.register().unwrap();
        assert_eq!(current, table.next_correlation_id() - 1);

        // A second result for the finished call is stale.
        assert!(!table.complete(previous, output(previous, "db1")));
        assert_eq!(table.stale_completions(), 1);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(table.is_waiting(current));

        // The correct completion still reaches the waiting caller.
        assert!(table.complete(current, output(current, "db2")));
        let delivered = rx.try_recv().unwrap().unwrap();
        assert_eq!(delivered.correlation_id, current);
        assert_eq!(delivered.database, "db2");
    }

    #[test]
    fn test_abandoned_id_turns_stale() {
        let table = CompletionTable::new();
        let (id, _rx) = table.register().unwrap();
        assert!(table.abandon(id));
        assert!(!table.complete(id, output(id, "db0")));
        assert_eq!(table.stale_completions(), 1);
    }

    #[test]
    fn test_guard_abandons_on_drop() {
        let table = CompletionTable::new();
        let (id, _rx) = table.register().unwrap();
        {
            let _guard = AbandonGuard::new(&table, id);
        }
        assert!(!table.is_waiting(id));
    }

    #[test]
    fn test_dropped_receiver_counts_as_stale() {
        let table = CompletionTable::new();
        let (id, rx) = table.register().unwrap();
        drop(rx);
        assert!(!table.complete(id, output(id, "db0")));
        assert_eq!(table.stale_completions(), 1);
        assert_eq!(table.in_flight(), 0);
    }

    #[test]
    fn test_close_fails_waiting_callers() {
        let table = CompletionTable::new();
        let (first, mut rx_first) = table.register().unwrap();
        let (_, mut rx_second) = table.register().unwrap();

        assert_eq!(table.close(), 2);
        assert_eq!(table.in_flight(), 0);
        assert!(matches!(rx_first.try_recv(), Ok(Err(BalancerError::Shutdown))));
        assert!(matches!(rx_second.try_recv(), Ok(Err(BalancerError::Shutdown))));

        // Late worker results for failed calls are stale.
        assert!(!table.complete(first, output(first, "db0")));
        assert_eq!(table.stale_completions(), 1);
    }

    #[test]
    fn test_register_after_close_is_refused() {
        let table = CompletionTable::new();
        table.close();
        assert!(matches!(table.register(), Err(BalancerError::Shutdown)));
        assert_eq!(table.in_flight(), 0);
        assert_eq!(table.next_correlation_id(), 0);
    }
}
