// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Existence queries against the destination store.
//!
//! A cycle turns the pending keys into [`ExistenceQuery`] descriptors
//! (see [`QueryBatchBuilder`]) and hands them to an
//! [`ExistenceQueryExecutor`]. Each descriptor gets back one
//! [`QueryOutcome`]: the hits it found, or the reason it failed.
//!
//! # Modules
//!
//! - [`batch_builder`]: chunking pending keys into bounded queries
//! - [`msearch`]: NDJSON multi-search request/response codec
//! - [`memory`]: in-process executor for local runs and tests

pub mod batch_builder;
pub mod memory;
pub mod msearch;

pub use batch_builder::QueryBatchBuilder;
pub use memory::InMemorySearchStore;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum keys referenced by one query descriptor.
pub const BATCH_SIZE: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("search store transport error: {0}")]
    Transport(String),
    #[error("query against '{index}' rejected ({status}): {reason}")]
    Rejected {
        index: String,
        status: u16,
        reason: String,
    },
    #[error("malformed search response: {0}")]
    Malformed(String),
}

/// Terms query for one chunk of dedup keys on one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistenceQuery {
    pub index: String,
    pub field: String,
    pub values: Vec<String>,
    /// Result-size cap, twice the chunk so duplicates inside the store still surface
    pub size: usize,
}

/// A document in the store whose dedup field matched a queried key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHit {
    pub index: String,
    pub key: String,
    pub document_id: String,
}

/// Result of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Hits(Vec<QueryHit>),
    Failure(QueryError),
}

impl QueryOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Runs a cycle's queries against the destination store.
///
/// Implementations return one outcome per descriptor, in order. `Err` means
/// the whole call failed and nothing can be said about any descriptor.
#[async_trait]
pub trait ExistenceQueryExecutor: Send + Sync {
    async fn execute(&self, queries: &[ExistenceQuery]) -> Result<Vec<QueryOutcome>, QueryError>;
}

/// Read the dedup field out of a document as a string.
///
/// Tries `field` as a dotted path first, then searches the document
/// depth-first for a member named `field`. Numbers and booleans are
/// rendered to their JSON text.
#[must_use]
pub fn term_value(document: &Value, field: &str) -> Option<String> {
    let by_path = if field.contains('.') {
        field
            .split('.')
            .try_fold(document, |node, segment| node.get(segment))
    } else {
        None
    };
    by_path.or_else(|| find_member(document, field)).and_then(scalar_text)
}

fn find_member<'a>(node: &'a Value, field: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map
            .get(field)
            .or_else(|| map.values().find_map(|child| find_member(child, field))),
        Value::Array(items) => items.iter().find_map(|child| find_member(child, field)),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_term_value_top_level() {
        assert_eq!(term_value(&json!({"id": "abc"}), "id"), Some("abc".into()));
    }

    #[test]
    fn test_term_value_dotted_path() {
        let doc = json!({"event": {"id": "abc"}, "id": "shadowed"});
        assert_eq!(term_value(&doc, "event.id"), Some("abc".into()));
    }

    #[test]
    fn test_term_value_nested_search() {
        let doc = json!({"meta": {"labels": [{"trace_id": "t-9"}]}});
        assert_eq!(term_value(&doc, "trace_id"), Some("t-9".into()));
    }

    #[test]
    fn test_term_value_literal_dotted_member() {
        let doc = json!({"event.id": "flat"});
        assert_eq!(term_value(&doc, "event.id"), Some("flat".into()));
    }

    #[test]
    fn test_term_value_scalars_and_missing() {
        assert_eq!(term_value(&json!({"n": 7}), "n"), Some("7".into()));
        assert_eq!(term_value(&json!({"b": true}), "b"), Some("true".into()));
        assert_eq!(term_value(&json!({"o": {"x": 1}}), "o"), None);
        assert_eq!(term_value(&json!({"other": 1}), "id"), None);
    }
}
