//! # Ingest Dedup
//!
//! Query-before-write deduplication for a bulk-indexing sink.
//!
//! Writes carrying a dedup key are held back while a background loop asks the
//! search store whether a document with that key already exists. Confirmed
//! duplicates are dropped and their source acknowledgment released; writes
//! nobody claims within the grace window are handed to the indexer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Producers                           │
//! │  • add(write) from any number of pipeline workers          │
//! │  • Same (index, key) replaces the pending write            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PendingOperationStore                      │
//! │  • index → dedup key → pending write                       │
//! │  • Own lock, never held across a query                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (poll loop, one cycle per interval)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             QueryBatchBuilder → Executor                    │
//! │  • ≤ max_terms keys per terms query, one per index chunk   │
//! │  • One multi-search call per cycle                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴────────────────┐
//!              ▼                                ▼
//!   hit: drop + release ack          past grace window: promote
//!                                               │
//!                                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ReadyQueue                            │
//! │  • drain_ready() swaps the whole queue out                 │
//! │  • Waits while in-flight documents exceed the ceiling      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ingest_dedup::{BulkOperation, DedupConfig, DedupCoordinator, InMemorySearchStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DedupConfig {
//!         query_term: "event_id".into(),
//!         query_duration_ms: 30_000,
//!         ..Default::default()
//!     };
//!
//!     let store = Arc::new(InMemorySearchStore::new());
//!     let coordinator = Arc::new(
//!         DedupCoordinator::<BulkOperation>::new(config, store).expect("valid config"),
//!     );
//!     let handle = coordinator.start().expect("inside a runtime");
//!
//!     let (op, ack) = BulkOperation::from_document(
//!         "logs-2025.03",
//!         json!({"event_id": "evt-1", "message": "login"}),
//!         "event_id",
//!     )
//!     .expect("document carries the dedup field");
//!     coordinator.add(Arc::new(op));
//!
//!     // Later, from the indexing worker
//!     for write in coordinator.drain_ready().await {
//!         println!("index {:?}", write.document());
//!     }
//!
//!     coordinator.stop();
//!     handle.await.expect("poll loop exits cleanly");
//!     drop(ack);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`DedupCoordinator`] and its poll loop
//! - [`pending`]: Writes waiting on a query
//! - [`ready`]: Writes cleared for indexing
//! - [`query`]: Batch building, the executor seam, `_msearch` wire format
//! - [`backpressure`]: In-flight counter and drain ceiling
//! - [`write_op`]: The write handle and its source acknowledgment
//! - [`progress`]: Crawler progress records

pub mod config;
pub mod write_op;
pub mod pending;
pub mod ready;
pub mod backpressure;
pub mod query;
pub mod coordinator;
pub mod metrics;
pub mod progress;

pub use config::{AwsConfig, ConfigError, DedupConfig};
pub use coordinator::{
    AddOutcome, CoordinatorError, CoordinatorState, CoordinatorStats, CycleError, CycleReport, DedupCoordinator,
};
pub use backpressure::{BackpressureGate, GateWait};
pub use write_op::{AckStatus, BulkOperation, WriteError, WriteOperation};
pub use pending::{PendingOperationStore, PendingSnapshot, PendingWrite, Visit};
pub use ready::ReadyQueue;
pub use query::{
    ExistenceQuery, ExistenceQueryExecutor, InMemorySearchStore, QueryBatchBuilder, QueryError, QueryHit,
    QueryOutcome, BATCH_SIZE,
};
pub use progress::{CrowdStrikeProgress, PaginationCrawlerProgress, WorkerProgressState};
