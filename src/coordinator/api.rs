//! Producer and consumer API: `add` and `drain_ready`.

use std::sync::Arc;

use tracing::debug;

use crate::backpressure::GateWait;
use crate::write_op::WriteOperation;

use super::{AddOutcome, DedupCoordinator};

impl<W: WriteOperation> DedupCoordinator<W> {
    /// Hold a write back until the duplicate check clears or drops it.
    ///
    /// A write for an `(index, key)` that is already pending replaces the
    /// earlier one and restarts its grace window. The superseded handle is
    /// returned unreleased in [`AddOutcome::Replaced`].
    ///
    /// Only contends on the pending-store lock; never waits on a query.
    pub fn add(&self, write: Arc<W>) -> AddOutcome<W> {
        let index = write.index().to_string();
        let key = write.dedup_key_value().to_string();

        // Count before inserting so a concurrent resolution can never take
        // the counter below the size of the pending set
        self.gate.increment();
        let outcome = match self.pending.add(&index, &key, write) {
            None => AddOutcome::New,
            Some(superseded) => {
                self.gate.decrement(1);
                self.counters.duplicate_in_manager();
                debug!(index = %index, key = %key, "Replaced pending write with the same query term value");
                AddOutcome::Replaced { superseded: superseded.payload }
            }
        };
        self.counters.added();
        outcome
    }

    /// Take every write cleared for indexing.
    ///
    /// Waits while more documents are being queried than the configured
    /// ceiling allows, re-checking whenever a cycle resolves writes and at
    /// least once per poll interval. A stop request ends the wait early.
    pub async fn drain_ready(&self) -> Vec<Arc<W>> {
        let mut shutdown = self.shutdown.subscribe();
        if self.gate.wait_until_clear(self.config.poll_interval(), &mut shutdown).await == GateWait::Shutdown {
            debug!("Draining ready writes during shutdown");
        }

        let batch = self.ready.swap();
        if !batch.is_empty() {
            self.counters.returned_for_indexing(batch.len());
            debug!(count = batch.len(), "Returning writes for indexing after query");
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::query::InMemorySearchStore;
    use crate::write_op::BulkOperation;
    use serde_json::json;
    use std::time::Duration;

    fn coordinator(limit: usize) -> DedupCoordinator<BulkOperation> {
        let config = DedupConfig {
            query_term: "event_id".into(),
            query_async_document_limit: limit,
            ..Default::default()
        };
        DedupCoordinator::new(config, Arc::new(InMemorySearchStore::new())).unwrap()
    }

    fn op(index: &str, key: &str) -> Arc<BulkOperation> {
        let (op, _rx) = BulkOperation::new(index, key, json!({ "event_id": key }));
        Arc::new(op)
    }

    #[test]
    fn test_add_new_and_replace() {
        let coordinator = coordinator(10);
        assert!(coordinator.add(op("logs-1", "abc")).is_new());
        assert!(coordinator.add(op("logs-1", "def")).is_new());

        let first = op("logs-1", "abc");
        let outcome = coordinator.add(first);
        assert!(matches!(outcome, AddOutcome::Replaced { .. }));

        let stats = coordinator.stats();
        assert_eq!(stats.added, 3);
        assert_eq!(stats.duplicates_in_manager, 1);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(coordinator.pending_len(), 2);
    }

    #[test]
    fn test_replaced_handle_is_not_released() {
        let coordinator = coordinator(10);
        let (first, mut first_rx) = BulkOperation::new("logs-1", "abc", json!({}));
        let first = Arc::new(first);
        coordinator.add(Arc::clone(&first));

        match coordinator.add(op("logs-1", "abc")) {
            AddOutcome::Replaced { superseded } => assert!(Arc::ptr_eq(&superseded, &first)),
            AddOutcome::New => panic!("expected replacement"),
        }
        assert!(!first.is_released());
        assert!(first_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drain_empty_under_ceiling() {
        let coordinator = coordinator(10);
        coordinator.add(op("logs-1", "abc"));
        assert!(coordinator.drain_ready().await.is_empty());
        assert_eq!(coordinator.stats().returned_for_indexing, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_blocks_over_ceiling() {
        let coordinator = coordinator(1);
        coordinator.add(op("logs-1", "a"));
        coordinator.add(op("logs-1", "b"));

        let drained = tokio::time::timeout(Duration::from_secs(60), coordinator.drain_ready()).await;
        assert!(drained.is_err(), "drain should wait while over the ceiling");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_released_by_stop() {
        let coordinator = Arc::new(coordinator(0));
        coordinator.add(op("logs-1", "a"));

        let drain = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.drain_ready().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        coordinator.stop();

        let drained = drain.await.unwrap();
        assert!(drained.is_empty());
    }
}
