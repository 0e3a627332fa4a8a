// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backpressure on the drain side of the coordinator.
//!
//! [`BackpressureGate`] owns the one in-flight counter: the number of writes
//! waiting for a query. The same counter feeds the `documentsBeingQueried`
//! gauge and the ceiling check in `drain_ready`, so the wait can actually
//! trip when the pending set grows past the configured limit.
//!
//! Waiters are woken when a cycle lowers the counter, and re-check at least
//! once per poll interval regardless.
//!
//! # Example
//!
//! ```
//! use ingest_dedup::BackpressureGate;
//!
//! let gate = BackpressureGate::new(2);
//! gate.increment();
//! gate.increment();
//! assert!(!gate.is_over_ceiling());
//!
//! gate.increment();
//! assert!(gate.is_over_ceiling());
//! assert_eq!(gate.pressure(), 1.5);
//!
//! gate.decrement(1);
//! assert!(!gate.is_over_ceiling());
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

/// How a wait on the gate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateWait {
    /// In-flight count is at or below the ceiling
    Clear,
    /// Coordinator is stopping; caller should proceed without waiting
    Shutdown,
}

pub struct BackpressureGate {
    in_flight: AtomicUsize,
    ceiling: usize,
    released: Notify,
    // Serializes gauge publication so the last value set is never stale
    publish: Mutex<()>,
}

impl BackpressureGate {
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            ceiling,
            released: Notify::new(),
            publish: Mutex::new(()),
        }
    }

    /// Count one more pending write. Returns the new total.
    pub fn increment(&self) -> usize {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish_gauge();
        now
    }

    /// Count `count` writes as resolved and wake drain waiters.
    pub fn decrement(&self, count: usize) -> usize {
        if count == 0 {
            return self.current();
        }
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(count)))
            .unwrap_or_else(|n| n);
        let now = previous.saturating_sub(count);
        self.publish_gauge();
        self.released.notify_waiters();
        now
    }

    fn publish_gauge(&self) {
        let _publish = self.publish.lock();
        crate::metrics::set_documents_being_queried(self.current());
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    #[must_use]
    pub fn is_over_ceiling(&self) -> bool {
        self.current() > self.ceiling
    }

    /// In-flight count relative to the ceiling (0.0 → 1.0+).
    #[must_use]
    pub fn pressure(&self) -> f64 {
        if self.ceiling == 0 {
            if self.current() == 0 { 0.0 } else { f64::INFINITY }
        } else {
            self.current() as f64 / self.ceiling as f64
        }
    }

    /// Wait until the in-flight count is at or below the ceiling.
    ///
    /// Re-checks on every release and at least every `max_staleness`.
    /// Returns early with [`GateWait::Shutdown`] once `shutdown` reads true.
    pub async fn wait_until_clear(
        &self,
        max_staleness: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> GateWait {
        let mut waited = false;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before reading the counter so a release in between is not missed
            released.as_mut().enable();

            let in_flight = self.current();
            if in_flight <= self.ceiling {
                if waited {
                    debug!(in_flight, ceiling = self.ceiling, "Documents being queried back under limit");
                }
                return GateWait::Clear;
            }
            let stopping = *shutdown.borrow();
            if stopping {
                warn!(in_flight, ceiling = self.ceiling, "Interrupted while waiting for documents being queried to drop under limit");
                return GateWait::Shutdown;
            }
            if !waited {
                debug!(in_flight, ceiling = self.ceiling, "Waiting for documents being queried to drop under limit");
            }
            waited = true;

            tokio::select! {
                _ = &mut released => {}
                _ = tokio::time::sleep(max_staleness) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown signal dropped while waiting on backpressure");
                        return GateWait::Shutdown;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_and_decrement() {
        let gate = BackpressureGate::new(10);
        assert_eq!(gate.increment(), 1);
        assert_eq!(gate.increment(), 2);
        assert_eq!(gate.decrement(1), 1);
        assert_eq!(gate.current(), 1);
    }

    #[test]
    fn test_gauge_settles_on_final_count_under_contention() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let gate = BackpressureGate::new(1_000);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let gate = &gate;
                let recorder = &recorder;
                scope.spawn(move || {
                    metrics::with_local_recorder(recorder, || {
                        for _ in 0..500 {
                            gate.increment();
                        }
                        // Half the workers leave their writes in flight
                        if worker % 2 == 0 {
                            for _ in 0..500 {
                                gate.decrement(1);
                            }
                        }
                    });
                });
            }
        });

        assert_eq!(gate.current(), 2_000);
        let gauge = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key.key().name() == crate::metrics::DOCUMENTS_CURRENTLY_BEING_QUERIED)
            .map(|(_, _, _, value)| value);
        assert!(matches!(gauge, Some(DebugValue::Gauge(v)) if v.0 == 2_000.0));
    }

    #[test]
    fn test_decrement_saturates() {
        let gate = BackpressureGate::new(10);
        gate.increment();
        assert_eq!(gate.decrement(5), 0);
        assert_eq!(gate.current(), 0);
    }

    #[test]
    fn test_pressure_with_zero_ceiling() {
        let gate = BackpressureGate::new(0);
        assert_eq!(gate.pressure(), 0.0);
        gate.increment();
        assert!(gate.pressure().is_infinite());
        assert!(gate.is_over_ceiling());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_under_ceiling() {
        let gate = BackpressureGate::new(1);
        gate.increment();
        let (_tx, mut rx) = watch::channel(false);
        assert_eq!(gate.wait_until_clear(Duration::from_secs(20), &mut rx).await, GateWait::Clear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_release() {
        let gate = Arc::new(BackpressureGate::new(1));
        gate.increment();
        gate.increment();
        let (_tx, mut rx) = watch::channel(false);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let start = tokio::time::Instant::now();
                let outcome = gate.wait_until_clear(Duration::from_secs(20), &mut rx).await;
                (outcome, start.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        gate.decrement(1);

        let (outcome, elapsed) = waiter.await.unwrap();
        assert_eq!(outcome, GateWait::Clear);
        assert!(elapsed < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_shutdown() {
        let gate = Arc::new(BackpressureGate::new(0));
        gate.increment();
        let (tx, mut rx) = watch::channel(false);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_until_clear(Duration::from_secs(20), &mut rx).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send_replace(true);
        assert_eq!(waiter.await.unwrap(), GateWait::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_rechecks_each_interval() {
        let gate = Arc::new(BackpressureGate::new(0));
        gate.increment();
        let (_tx, mut rx) = watch::channel(false);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let start = tokio::time::Instant::now();
                let outcome = gate.wait_until_clear(Duration::from_millis(100), &mut rx).await;
                (outcome, start.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        // Lower the counter without notifying; only the periodic re-check can see it
        gate.in_flight.store(0, Ordering::Release);

        let (outcome, elapsed) = waiter.await.unwrap();
        assert_eq!(outcome, GateWait::Clear);
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed <= Duration::from_millis(400));
    }
}
