// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Writes cleared for indexing.
//!
//! Draining swaps the whole set out under the lock and leaves a fresh empty
//! one behind, so a write installed concurrently lands in exactly one drain.

use std::sync::Arc;

use parking_lot::Mutex;

pub struct ReadyQueue<W> {
    items: Mutex<Vec<Arc<W>>>,
}

impl<W> ReadyQueue<W> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Install a batch of promoted writes.
    pub fn extend(&self, batch: Vec<Arc<W>>) {
        if batch.is_empty() {
            return;
        }
        self.items.lock().extend(batch);
    }

    /// Take everything currently ready.
    pub fn swap(&self) -> Vec<Arc<W>> {
        std::mem::take(&mut *self.items.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<W> Default for ReadyQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}
