// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dedup coordinator.
//!
//! The [`DedupCoordinator`] sits in front of the bulk-write path and holds each
//! write back until an existence query has had a chance to find a document
//! with the same dedup key:
//! - producers [`add`](DedupCoordinator::add) writes into the pending store
//! - a background loop runs one cycle per poll interval: snapshot, batch,
//!   query, drop confirmed duplicates, promote writes past the grace window
//! - consumers [`drain_ready`](DedupCoordinator::drain_ready) the cleared writes,
//!   waiting while too many documents are still being queried
//!
//! # Lifecycle
//!
//! ```text
//! Stopped → Running → Stopping → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingest_dedup::{BulkOperation, DedupConfig, DedupCoordinator, InMemorySearchStore};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DedupConfig { query_term: "event_id".into(), ..Default::default() };
//! let store = Arc::new(InMemorySearchStore::new());
//! let coordinator = Arc::new(DedupCoordinator::<BulkOperation>::new(config, store)?);
//!
//! let handle = coordinator.start()?;
//!
//! let (op, _ack) = BulkOperation::from_document("logs-1", json!({"event_id": "abc"}), "event_id")?;
//! coordinator.add(Arc::new(op));
//!
//! let ready = coordinator.drain_ready().await;
//! println!("{} writes cleared for indexing", ready.len());
//!
//! coordinator.stop();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

mod types;
mod api;
mod cycle;
mod lifecycle;

pub use types::{AddOutcome, CoordinatorError, CoordinatorState, CoordinatorStats, CycleError, CycleReport};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backpressure::BackpressureGate;
use crate::config::{ConfigError, DedupConfig};
use crate::pending::PendingOperationStore;
use crate::query::{ExistenceQueryExecutor, QueryBatchBuilder};
use crate::ready::ReadyQueue;
use crate::write_op::WriteOperation;

use types::Counters;

/// Query-before-write coordinator for one bulk sink.
///
/// # Thread Safety
///
/// `add` and `drain_ready` may be called from any number of threads while the
/// poll loop runs. The pending store and the ready queue each have their own
/// lock, and neither is held across the remote query.
pub struct DedupCoordinator<W: WriteOperation> {
    config: DedupConfig,

    batch_builder: QueryBatchBuilder,

    executor: Arc<dyn ExistenceQueryExecutor>,

    /// Writes waiting for a query (waiting-for-query lock domain)
    pending: PendingOperationStore<W>,

    /// Writes cleared for indexing (ready lock domain)
    ready: ReadyQueue<W>,

    /// The in-flight counter, gauge source and drain ceiling
    gate: BackpressureGate,

    counters: Counters,

    /// When the previous cycle's query pass completed; promotion cutoff
    last_query_completed: Mutex<Option<Instant>>,

    /// Serializes cycles between the loop and manual `run_cycle` calls
    cycle_lock: tokio::sync::Mutex<()>,

    state: watch::Sender<CoordinatorState>,

    state_rx: watch::Receiver<CoordinatorState>,

    /// Stop flag observed by the loop and by drain waiters
    shutdown: watch::Sender<bool>,
}

impl<W: WriteOperation> DedupCoordinator<W> {
    /// Create a stopped coordinator. Call [`start()`](Self::start) to run the loop.
    pub fn new(config: DedupConfig, executor: Arc<dyn ExistenceQueryExecutor>) -> Result<Self, ConfigError> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(CoordinatorState::Stopped);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            batch_builder: QueryBatchBuilder::new(config.query_term.clone(), config.max_terms_per_query),
            pending: PendingOperationStore::new(config.grace_window()),
            ready: ReadyQueue::new(),
            gate: BackpressureGate::new(config.query_async_document_limit),
            counters: Counters::default(),
            last_query_completed: Mutex::new(None),
            cycle_lock: tokio::sync::Mutex::new(()),
            state: state_tx,
            state_rx,
            shutdown,
            executor,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<CoordinatorState> {
        self.state_rx.clone()
    }

    /// Writes currently waiting for a query.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Writes cleared and waiting for the next drain.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.gate.current()
    }

    /// In-flight documents relative to the configured ceiling.
    #[must_use]
    pub fn pressure(&self) -> f64 {
        self.gate.pressure()
    }

    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        self.counters.snapshot(self.gate.current())
    }
}
