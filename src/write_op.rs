// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write-operation handles held by the coordinator.
//!
//! The coordinator only ever sees a [`WriteOperation`]: it reads the
//! destination index and dedup key and, for confirmed duplicates, releases
//! the source acknowledgment. [`BulkOperation`] is the concrete handle used by
//! the bulk sink, acknowledging its source through a one-shot channel.
//!
//! # Example
//!
//! ```
//! use ingest_dedup::{AckStatus, BulkOperation, WriteOperation};
//! use serde_json::json;
//!
//! let (op, ack) = BulkOperation::from_document(
//!     "logs-1",
//!     json!({"event": {"id": "abc"}, "message": "hello"}),
//!     "event.id",
//! ).unwrap();
//! assert_eq!(op.dedup_key_value(), "abc");
//!
//! op.release_source_ack(true);
//! op.release_source_ack(true); // ignored, already released
//! # let mut ack = ack;
//! assert_eq!(ack.try_recv().unwrap(), AckStatus::Dropped);
//! ```

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::query::term_value;

/// A write operation waiting on (or cleared by) the duplicate check.
pub trait WriteOperation: Send + Sync + 'static {
    /// Destination index for the write
    fn index(&self) -> &str;

    /// Value of the configured dedup field
    fn dedup_key_value(&self) -> &str;

    /// Signal the originating stage. `dropped = true` means the write will
    /// never be issued.
    fn release_source_ack(&self, dropped: bool);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("document has no value for dedup field '{0}'")]
    MissingDedupField(String),
}

/// What the source stage learns when a handle is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Write suppressed, an existing document already carries the key
    Dropped,
    /// Write handed on for indexing
    Released,
}

/// Bulk index operation carrying its document and a one-shot acknowledgment.
pub struct BulkOperation {
    index: String,
    dedup_key: String,
    document_id: Option<String>,
    document: Value,
    // Option lets the sender move out exactly once
    ack: Mutex<Option<oneshot::Sender<AckStatus>>>,
}

impl BulkOperation {
    pub fn new(
        index: impl Into<String>,
        dedup_key: impl Into<String>,
        document: Value,
    ) -> (Self, oneshot::Receiver<AckStatus>) {
        let (tx, rx) = oneshot::channel();
        let op = Self {
            index: index.into(),
            dedup_key: dedup_key.into(),
            document_id: None,
            document,
            ack: Mutex::new(Some(tx)),
        };
        (op, rx)
    }

    /// Build an operation, reading the dedup key out of the document.
    pub fn from_document(
        index: impl Into<String>,
        document: Value,
        query_term: &str,
    ) -> Result<(Self, oneshot::Receiver<AckStatus>), WriteError> {
        let key = term_value(&document, query_term)
            .ok_or_else(|| WriteError::MissingDedupField(query_term.to_string()))?;
        Ok(Self::new(index, key, document))
    }

    #[must_use]
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.ack.lock().is_none()
    }
}

impl WriteOperation for BulkOperation {
    fn index(&self) -> &str {
        &self.index
    }

    fn dedup_key_value(&self) -> &str {
        &self.dedup_key
    }

    fn release_source_ack(&self, dropped: bool) {
        let Some(tx) = self.ack.lock().take() else {
            debug!(index = %self.index, key = %self.dedup_key, "Source ack already released");
            return;
        };
        let status = if dropped { AckStatus::Dropped } else { AckStatus::Released };
        // Receiver may be gone if the source stopped waiting
        let _ = tx.send(status);
    }
}

impl std::fmt::Debug for BulkOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkOperation")
            .field("index", &self.index)
            .field("dedup_key", &self.dedup_key)
            .field("document_id", &self.document_id)
            .field("released", &self.is_released())
            .finish()
    }
}
