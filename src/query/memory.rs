// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process search store for local runs and tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use super::{ExistenceQuery, ExistenceQueryExecutor, QueryError, QueryHit, QueryOutcome};

/// Documents keyed by index, then by dedup key value.
///
/// Indexes marked with [`fail_index`](Self::fail_index) answer every query
/// with a rejected sub-query until [`heal_index`](Self::heal_index) is called.
pub struct InMemorySearchStore {
    documents: DashMap<String, DashMap<String, String>>,
    failing: DashSet<String>,
    calls: AtomicU64,
}

impl InMemorySearchStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            failing: DashSet::new(),
            calls: AtomicU64::new(0),
        }
    }

    /// Index a document carrying `key` under `document_id`.
    pub fn insert(&self, index: &str, key: &str, document_id: &str) {
        self.documents
            .entry(index.to_string())
            .or_default()
            .insert(key.to_string(), document_id.to_string());
    }

    #[must_use]
    pub fn contains(&self, index: &str, key: &str) -> bool {
        self.documents
            .get(index)
            .is_some_and(|docs| docs.contains_key(key))
    }

    pub fn fail_index(&self, index: &str) {
        self.failing.insert(index.to_string());
    }

    pub fn heal_index(&self, index: &str) {
        self.failing.remove(index);
    }

    /// Number of `execute` calls served.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.iter().map(|docs| docs.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn run(&self, query: &ExistenceQuery) -> QueryOutcome {
        if self.failing.contains(&query.index) {
            return QueryOutcome::Failure(QueryError::Rejected {
                index: query.index.clone(),
                status: 503,
                reason: "index unavailable".into(),
            });
        }
        let Some(docs) = self.documents.get(&query.index) else {
            return QueryOutcome::Hits(Vec::new());
        };
        let hits = query
            .values
            .iter()
            .filter_map(|key| {
                docs.get(key).map(|id| QueryHit {
                    index: query.index.clone(),
                    key: key.clone(),
                    document_id: id.value().clone(),
                })
            })
            .take(query.size)
            .collect();
        QueryOutcome::Hits(hits)
    }
}

impl Default for InMemorySearchStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExistenceQueryExecutor for InMemorySearchStore {
    async fn execute(&self, queries: &[ExistenceQuery]) -> Result<Vec<QueryOutcome>, QueryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(queries.iter().map(|query| self.run(query)).collect())
    }
}
