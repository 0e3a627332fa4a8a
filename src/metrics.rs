// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the dedup coordinator.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding pipeline is responsible for choosing the exporter.
//!
//! Metric names are shared with existing dashboards and must not change.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub const EVENTS_ADDED_FOR_QUERYING: &str = "eventsAddedForQuerying";
pub const EVENTS_DROPPED_AND_RELEASED: &str = "eventsDroppedAndReleasedAfterQuery";
pub const EVENTS_RETURNED_FOR_INDEXING: &str = "eventsReturnedForIndexingAfterQuery";
pub const DUPLICATE_EVENTS_IN_QUERY_MANAGER: &str = "duplicateEventsInQueryManager";
pub const DOCUMENTS_CURRENTLY_BEING_QUERIED: &str = "documentsBeingQueried";
pub const QUERY_TIME: &str = "queryDuplicatesTime";
pub const POTENTIAL_DUPLICATES: &str = "potentialDuplicates";
pub const QUERY_FAILURES: &str = "queryDuplicatesFailures";

/// Record a write accepted for querying
pub fn record_added() {
    counter!(EVENTS_ADDED_FOR_QUERYING).increment(1);
}

/// Record a write that replaced a pending write with the same key
pub fn record_duplicate_in_manager() {
    counter!(DUPLICATE_EVENTS_IN_QUERY_MANAGER).increment(1);
}

/// Record writes dropped because the store already holds their key
pub fn record_dropped_and_released(count: usize) {
    counter!(EVENTS_DROPPED_AND_RELEASED).increment(count as u64);
}

/// Record writes handed back to the bulk path
pub fn record_returned_for_indexing(count: usize) {
    counter!(EVENTS_RETURNED_FOR_INDEXING).increment(count as u64);
}

/// Record a hit for a key that is no longer pending
pub fn record_potential_duplicate() {
    counter!(POTENTIAL_DUPLICATES).increment(1);
}

/// Record a failed query call or sub-query
pub fn record_query_failure(count: usize) {
    counter!(QUERY_FAILURES).increment(count as u64);
}

/// Set the number of documents waiting for a query
pub fn set_documents_being_queried(count: usize) {
    gauge!(DOCUMENTS_CURRENTLY_BEING_QUERIED).set(count as f64);
}

/// Record how long one cycle took
pub fn record_query_time(duration: Duration) {
    histogram!(QUERY_TIME).record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    fn counter_value(snapshot: &[(metrics_util::CompositeKey, DebugValue)], name: &str) -> Option<u64> {
        snapshot.iter().find_map(|(key, value)| match value {
            DebugValue::Counter(v) if key.kind() == MetricKind::Counter && key.key().name() == name => Some(*v),
            _ => None,
        })
    }

    #[test]
    fn test_counters_use_fixed_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_added();
            record_added();
            record_duplicate_in_manager();
            record_dropped_and_released(3);
            record_returned_for_indexing(4);
            record_potential_duplicate();
            record_query_failure(2);
        });

        let snapshot: Vec<_> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key, value))
            .collect();

        assert_eq!(counter_value(&snapshot, "eventsAddedForQuerying"), Some(2));
        assert_eq!(counter_value(&snapshot, "duplicateEventsInQueryManager"), Some(1));
        assert_eq!(counter_value(&snapshot, "eventsDroppedAndReleasedAfterQuery"), Some(3));
        assert_eq!(counter_value(&snapshot, "eventsReturnedForIndexingAfterQuery"), Some(4));
        assert_eq!(counter_value(&snapshot, "potentialDuplicates"), Some(1));
        assert_eq!(counter_value(&snapshot, "queryDuplicatesFailures"), Some(2));
    }

    #[test]
    fn test_gauge_and_timer_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_documents_being_queried(12);
            set_documents_being_queried(7);
            record_query_time(Duration::from_millis(250));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let gauge = snapshot
            .iter()
            .find(|(key, _, _, _)| key.kind() == MetricKind::Gauge && key.key().name() == "documentsBeingQueried")
            .map(|(_, _, _, value)| value.clone());
        assert!(matches!(gauge, Some(DebugValue::Gauge(v)) if v.0 == 7.0));

        let timer = snapshot
            .iter()
            .find(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == "queryDuplicatesTime")
            .map(|(_, _, _, value)| value.clone());
        assert!(matches!(timer, Some(DebugValue::Histogram(samples)) if samples.len() == 1 && samples[0].0 == 0.25));
    }

}
