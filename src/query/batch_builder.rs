// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Chunk pending keys into bounded existence queries.
//!
//! Remote query engines cap request sizes, so no descriptor references more
//! than `max_terms` keys. An index with `N` pending keys yields
//! `ceil(N / max_terms)` descriptors.
//!
//! # Example
//!
//! ```
//! use ingest_dedup::QueryBatchBuilder;
//! use std::collections::BTreeMap;
//!
//! let builder = QueryBatchBuilder::new("event_id", 2);
//! let mut pending = BTreeMap::new();
//! pending.insert("logs-1".to_string(), vec!["a".into(), "b".into(), "c".into()]);
//!
//! let queries = builder.build(&pending);
//! assert_eq!(queries.len(), 2);
//! assert_eq!(queries[0].values, vec!["a", "b"]);
//! assert_eq!(queries[0].size, 4);
//! assert_eq!(queries[1].values, vec!["c"]);
//! assert_eq!(queries[1].size, 2);
//! ```

use tracing::info;

use super::{ExistenceQuery, BATCH_SIZE};
use crate::pending::PendingSnapshot;

#[derive(Debug, Clone)]
pub struct QueryBatchBuilder {
    field: String,
    max_terms: usize,
}

impl QueryBatchBuilder {
    /// `max_terms` of zero is treated as one.
    pub fn new(field: impl Into<String>, max_terms: usize) -> Self {
        Self {
            field: field.into(),
            max_terms: max_terms.max(1),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn max_terms(&self) -> usize {
        self.max_terms
    }

    /// Build one descriptor per chunk of keys, index by index.
    #[must_use]
    pub fn build(&self, pending: &PendingSnapshot) -> Vec<ExistenceQuery> {
        let mut queries = Vec::new();
        for (index, keys) in pending {
            if keys.is_empty() {
                continue;
            }
            info!(
                index = %index,
                terms = keys.len(),
                batch_size = self.max_terms,
                "Creating search requests for query term values"
            );
            queries.extend(keys.chunks(self.max_terms).map(|chunk| ExistenceQuery {
                index: index.clone(),
                field: self.field.clone(),
                values: chunk.to_vec(),
                size: chunk.len() * 2,
            }));
        }
        queries
    }
}

impl Default for QueryBatchBuilder {
    fn default() -> Self {
        Self::new(String::new(), BATCH_SIZE)
    }
}
