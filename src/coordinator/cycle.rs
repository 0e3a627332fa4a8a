//! One query cycle: snapshot, batch, query, resolve, promote.
//!
//! The remote call runs with no lock held. Hit resolution takes the pending
//! lock once per hit; promotion takes it once for the sweep and the ready
//! lock once to install the promoted batch. The two locks are never held
//! together.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::pending::Visit;
use crate::query::{ExistenceQuery, QueryHit, QueryOutcome};
use crate::write_op::WriteOperation;

use super::{CycleError, CycleReport, DedupCoordinator};

impl<W: WriteOperation> DedupCoordinator<W> {
    /// Run one cycle now.
    ///
    /// Returns an idle report when nothing is pending. Waits for a cycle
    /// already in progress to finish first. A failed query call resolves
    /// nothing and leaves the promotion cutoff where it was; every pending
    /// write is queried again on the next cycle.
    #[tracing::instrument(skip(self), fields(pending = tracing::field::Empty))]
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let snapshot = self.pending.snapshot_keys();
        if snapshot.is_empty() {
            return Ok(CycleReport::default());
        }
        tracing::Span::current().record("pending", snapshot.values().map(Vec::len).sum::<usize>());

        let queries = self.batch_builder.build(&snapshot);
        let mut report = CycleReport {
            queries: queries.len(),
            ..Default::default()
        };

        let outcomes = match self.executor.execute(&queries).await {
            Ok(outcomes) => outcomes,
            Err(source) => {
                self.counters.query_failures(queries.len());
                self.counters.cycle_completed(started.elapsed());
                let indexes: Vec<String> = snapshot.into_keys().collect();
                error!(indexes = ?indexes, error = %source, "Exception while querying for existing documents");
                return Err(CycleError::Query { indexes, source });
            }
        };

        if outcomes.len() != queries.len() {
            warn!(
                expected = queries.len(),
                received = outcomes.len(),
                "Search returned a different number of responses than requests"
            );
            report.failed_queries += queries.len().saturating_sub(outcomes.len());
        }

        for (query, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                QueryOutcome::Failure(e) => {
                    report.failed_queries += 1;
                    error!(
                        index = %query.index,
                        terms = query.values.len(),
                        error = %e,
                        "Search response failed, potential for duplicate documents"
                    );
                }
                QueryOutcome::Hits(hits) => {
                    report.hits += hits.len();
                    for hit in &hits {
                        if self.drop_and_release(query, hit) {
                            report.dropped += 1;
                        } else {
                            report.potential_duplicates += 1;
                        }
                    }
                }
            }
        }
        self.counters.query_failures(report.failed_queries);

        report.promoted = self.promote_expired();
        *self.last_query_completed.lock() = Some(Instant::now());

        report.duration = started.elapsed();
        self.counters.cycle_completed(report.duration);
        if report.dropped > 0 || report.promoted > 0 || report.failed_queries > 0 {
            info!(
                queries = report.queries,
                failed = report.failed_queries,
                dropped = report.dropped,
                promoted = report.promoted,
                potential_duplicates = report.potential_duplicates,
                duration_ms = report.duration.as_millis() as u64,
                "Query cycle complete"
            );
        }
        Ok(report)
    }

    /// Drop the pending write a hit confirms as a duplicate.
    ///
    /// Returns false when nothing is pending for the hit's key.
    fn drop_and_release(&self, query: &ExistenceQuery, hit: &QueryHit) -> bool {
        let removed = self.pending.remove(&hit.index, &hit.key).or_else(|| {
            // Hit reported under the concrete index behind an alias
            (hit.index != query.index)
                .then(|| self.pending.remove(&query.index, &hit.key))
                .flatten()
        });

        let Some(write) = removed else {
            warn!(
                index = %hit.index,
                key = %hit.key,
                id = %hit.document_id,
                "Bulk operation for term value is not pending, potentially a duplicate document"
            );
            self.counters.potential_duplicate();
            return false;
        };

        debug!(index = %write.index, key = %write.dedup_key, "Found document with query term, dropping and releasing event handle");
        write.payload.release_source_ack(true);
        self.counters.dropped_and_released(1);
        self.gate.decrement(1);
        true
    }

    /// Move writes past the grace window, measured against the previous
    /// cycle's completion, into the ready queue.
    fn promote_expired(&self) -> usize {
        let cutoff = *self.last_query_completed.lock();
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let mut promoted = Vec::new();
        self.pending.for_each_expired(cutoff, |write| {
            debug!(index = %write.index, key = %write.dedup_key, "Moving bulk operation to be ingested after finding no existing document");
            promoted.push(Arc::clone(&write.payload));
            Visit::Consume
        });

        let count = promoted.len();
        self.ready.extend(promoted);
        self.gate.decrement(count);
        count
    }
}
