// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Writes waiting on the duplicate check.
//!
//! [`PendingOperationStore`] maps destination index → dedup key → the single
//! [`PendingWrite`] for that pair. Every access goes through one mutex that is
//! held only for the map mutation itself, never across a remote call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};


/// One write awaiting resolution.
#[derive(Debug)]
pub struct PendingWrite<W> {
    pub index: String,
    pub dedup_key: String,
    pub payload: Arc<W>,
    pub enqueued_at: Instant,
}

impl<W> PendingWrite<W> {
    #[must_use]
    pub fn is_expired(&self, grace_window: Duration, cutoff: Instant) -> bool {
        self.enqueued_at + grace_window < cutoff
    }
}

/// Whether [`PendingOperationStore::for_each_expired`] keeps or removes an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Consume,
    Keep,
}

/// Point-in-time view of pending keys, sorted for stable batching.
pub type PendingSnapshot = BTreeMap<String, Vec<String>>;

type IndexMap<W> = HashMap<String, HashMap<String, PendingWrite<W>>>;

pub struct PendingOperationStore<W> {
    entries: Mutex<IndexMap<W>>,
    grace_window: Duration,
}

impl<W> PendingOperationStore<W> {
    #[must_use]
    pub fn new(grace_window: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            grace_window,
        }
    }

    /// Insert or replace the write for its `(index, key)` pair.
    ///
    /// Returns the superseded write when the pair was already pending.
    /// The superseded payload is handed back untouched, never released here.
    pub fn add(&self, index: &str, key: &str, payload: Arc<W>) -> Option<PendingWrite<W>> {
        let write = PendingWrite {
            index: index.to_string(),
            dedup_key: key.to_string(),
            payload,
            enqueued_at: Instant::now(),
        };
        self.entries
            .lock()
            .entry(index.to_string())
            .or_default()
            .insert(key.to_string(), write)
    }

    /// Keys per index, without removing anything.
    #[must_use]
    pub fn snapshot_keys(&self) -> PendingSnapshot {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(_, writes)| !writes.is_empty())
            .map(|(index, writes)| {
                let mut keys: Vec<String> = writes.keys().cloned().collect();
                keys.sort_unstable();
                (index.clone(), keys)
            })
            .collect()
    }

    /// Remove and return the write for `(index, key)`, if still pending.
    pub fn remove(&self, index: &str, key: &str) -> Option<PendingWrite<W>> {
        let mut entries = self.entries.lock();
        let writes = entries.get_mut(index)?;
        let removed = writes.remove(key);
        if writes.is_empty() {
            entries.remove(index);
        }
        removed
    }

    /// Visit every write whose grace window ended before `cutoff`.
    ///
    /// Entries for which `visit` returns [`Visit::Consume`] are removed.
    /// Returns the number removed.
    pub fn for_each_expired<F>(&self, cutoff: Instant, mut visit: F) -> usize
    where
        F: FnMut(&PendingWrite<W>) -> Visit,
    {
        let grace_window = self.grace_window;
        let mut consumed = 0;
        let mut entries = self.entries.lock();
        for writes in entries.values_mut() {
            writes.retain(|_, write| {
                if write.is_expired(grace_window, cutoff) && visit(write) == Visit::Consume {
                    consumed += 1;
                    false
                } else {
                    true
                }
            });
        }
        entries.retain(|_, writes| !writes.is_empty());
        consumed
    }

    #[must_use]
    pub fn contains(&self, index: &str, key: &str) -> bool {
        self.entries
            .lock()
            .get(index)
            .is_some_and(|writes| writes.contains_key(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().values().all(HashMap::is_empty)
    }

    #[must_use]
    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }
}
