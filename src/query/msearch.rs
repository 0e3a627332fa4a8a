// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Multi-search codec for OpenSearch-compatible stores.
//!
//! Renders a cycle's descriptors as one `_msearch` NDJSON body (a header line
//! and a body line per descriptor) and maps the `responses` array back onto
//! [`QueryOutcome`]s in the same order. The HTTP client that carries the
//! bytes belongs to the embedding sink.
//!
//! # Example
//!
//! ```
//! use ingest_dedup::query::{msearch, ExistenceQuery, QueryOutcome};
//! use serde_json::json;
//!
//! let queries = vec![ExistenceQuery {
//!     index: "logs-1".into(),
//!     field: "event_id".into(),
//!     values: vec!["abc".into()],
//!     size: 2,
//! }];
//! let body = msearch::render_request(&queries).unwrap();
//! assert_eq!(body.lines().count(), 2);
//!
//! let response = json!({"responses": [{"hits": {"hits": [
//!     {"_index": "logs-1", "_id": "doc-1", "_source": {"event_id": "abc"}}
//! ]}}]});
//! let outcomes = msearch::parse_response(&response, &queries).unwrap();
//! assert!(matches!(&outcomes[0], QueryOutcome::Hits(hits) if hits[0].key == "abc"));
//! ```

use serde_json::{json, Value};
use tracing::warn;

use super::{term_value, ExistenceQuery, QueryError, QueryHit, QueryOutcome};

/// Render descriptors as an NDJSON `_msearch` body (trailing newline included).
pub fn render_request(queries: &[ExistenceQuery]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for query in queries {
        let header = json!({ "index": query.index });
        let search = json!({
            "size": query.size,
            "_source": { "includes": [query.field] },
            "query": {
                "terms": { query.field.as_str(): query.values }
            }
        });
        body.push_str(&serde_json::to_string(&header)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&search)?);
        body.push('\n');
    }
    Ok(body)
}

/// Map an `_msearch` response onto per-descriptor outcomes.
///
/// Entries carrying an `error` member become [`QueryOutcome::Failure`].
/// Hits whose `_source` lacks the dedup field are skipped with a warning.
pub fn parse_response(response: &Value, queries: &[ExistenceQuery]) -> Result<Vec<QueryOutcome>, QueryError> {
    let responses = response
        .get("responses")
        .and_then(Value::as_array)
        .ok_or_else(|| QueryError::Malformed("missing 'responses' array".into()))?;

    if responses.len() != queries.len() {
        return Err(QueryError::Malformed(format!(
            "expected {} responses, got {}",
            queries.len(),
            responses.len()
        )));
    }

    Ok(responses
        .iter()
        .zip(queries)
        .map(|(entry, query)| parse_entry(entry, query))
        .collect())
}

fn parse_entry(entry: &Value, query: &ExistenceQuery) -> QueryOutcome {
    if let Some(error) = entry.get("error") {
        let status = entry
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(500);
        let reason = error
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return QueryOutcome::Failure(QueryError::Rejected {
            index: query.index.clone(),
            status,
            reason,
        });
    }

    let Some(hits) = entry.pointer("/hits/hits").and_then(Value::as_array) else {
        return QueryOutcome::Failure(QueryError::Malformed(format!(
            "response for '{}' has no hits array",
            query.index
        )));
    };

    let parsed = hits
        .iter()
        .filter_map(|hit| {
            let document_id = hit.get("_id").and_then(Value::as_str).unwrap_or_default().to_string();
            let index = hit
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or(&query.index)
                .to_string();
            let key = hit.get("_source").and_then(|source| term_value(source, &query.field));
            match key {
                Some(key) => Some(QueryHit { index, key, document_id }),
                None => {
                    warn!(index = %index, id = %document_id, field = %query.field, "Hit has no value for query term, ignoring");
                    None
                }
            }
        })
        .collect();
    QueryOutcome::Hits(parsed)
}
