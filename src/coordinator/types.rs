//! Public types for the dedup coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::query::QueryError;

/// Coordinator lifecycle state.
///
/// ```text
/// Stopped → Running → Stopping → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No background loop
    Stopped,
    /// Background loop polling
    Running,
    /// Stop requested; the current cycle is finishing
    Stopping,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("coordinator cannot start while {0}")]
    NotStopped(CoordinatorState),
    #[error("no tokio runtime available to run the poll loop")]
    NoRuntime,
}

#[derive(Error, Debug)]
pub enum CycleError {
    /// The multi-query call failed as a whole; nothing was resolved
    #[error("existence query failed for indexes {indexes:?}: {source}")]
    Query {
        indexes: Vec<String>,
        #[source]
        source: QueryError,
    },
}

/// Result of [`super::DedupCoordinator::add`].
#[derive(Debug)]
pub enum AddOutcome<W> {
    /// First pending write for this `(index, key)`
    New,
    /// Replaced an earlier pending write. The superseded handle has not been
    /// released; what to do with it is the caller's decision.
    Replaced { superseded: Arc<W> },
}

impl<W> AddOutcome<W> {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Query descriptors sent
    pub queries: usize,
    /// Descriptors that came back as failures
    pub failed_queries: usize,
    /// Hits returned across all descriptors
    pub hits: usize,
    /// Pending writes dropped as confirmed duplicates
    pub dropped: usize,
    /// Hits with no pending write to match
    pub potential_duplicates: usize,
    /// Pending writes promoted to ready
    pub promoted: usize,
    pub duration: Duration,
}

impl CycleReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queries == 0
    }
}

/// Point-in-time copy of the coordinator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub added: u64,
    pub dropped_and_released: u64,
    pub returned_for_indexing: u64,
    pub duplicates_in_manager: u64,
    pub potential_duplicates: u64,
    pub query_failures: u64,
    /// Non-idle cycles run, including those whose query call failed
    pub cycles: u64,
    pub in_flight: usize,
}

/// Running totals behind [`CoordinatorStats`]; each bump also goes to the
/// metrics facade.
#[derive(Debug, Default)]
pub(super) struct Counters {
    added: AtomicU64,
    dropped_and_released: AtomicU64,
    returned_for_indexing: AtomicU64,
    duplicates_in_manager: AtomicU64,
    potential_duplicates: AtomicU64,
    query_failures: AtomicU64,
    cycles: AtomicU64,
}

impl Counters {
    pub(super) fn added(&self) {
        self.added.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_added();
    }

    pub(super) fn duplicate_in_manager(&self) {
        self.duplicates_in_manager.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_duplicate_in_manager();
    }

    pub(super) fn dropped_and_released(&self, count: usize) {
        self.dropped_and_released.fetch_add(count as u64, Ordering::Relaxed);
        crate::metrics::record_dropped_and_released(count);
    }

    pub(super) fn returned_for_indexing(&self, count: usize) {
        self.returned_for_indexing.fetch_add(count as u64, Ordering::Relaxed);
        crate::metrics::record_returned_for_indexing(count);
    }

    pub(super) fn potential_duplicate(&self) {
        self.potential_duplicates.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_potential_duplicate();
    }

    pub(super) fn query_failures(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.query_failures.fetch_add(count as u64, Ordering::Relaxed);
        crate::metrics::record_query_failure(count);
    }

    pub(super) fn cycle_completed(&self, duration: Duration) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_query_time(duration);
    }

    pub(super) fn snapshot(&self, in_flight: usize) -> CoordinatorStats {
        CoordinatorStats {
            added: self.added.load(Ordering::Relaxed),
            dropped_and_released: self.dropped_and_released.load(Ordering::Relaxed),
            returned_for_indexing: self.returned_for_indexing.load(Ordering::Relaxed),
            duplicates_in_manager: self.duplicates_in_manager.load(Ordering::Relaxed),
            potential_duplicates: self.potential_duplicates.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            in_flight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", CoordinatorState::Stopped), "Stopped");
        assert_eq!(format!("{}", CoordinatorState::Running), "Running");
        assert_eq!(format!("{}", CoordinatorState::Stopping), "Stopping");
    }

    #[test]
    fn test_add_outcome_is_new() {
        let outcome: AddOutcome<u8> = AddOutcome::New;
        assert!(outcome.is_new());
        let outcome = AddOutcome::Replaced { superseded: Arc::new(1u8) };
        assert!(!outcome.is_new());
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::default();
        counters.added();
        counters.added();
        counters.duplicate_in_manager();
        counters.dropped_and_released(3);
        counters.query_failures(0);
        counters.query_failures(2);

        let stats = counters.snapshot(7);
        assert_eq!(stats.added, 2);
        assert_eq!(stats.duplicates_in_manager, 1);
        assert_eq!(stats.dropped_and_released, 3);
        assert_eq!(stats.query_failures, 2);
        assert_eq!(stats.in_flight, 7);
    }

    #[test]
    fn test_idle_report() {
        assert!(CycleReport::default().is_idle());
    }
}
