// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the dedup coordinator.
//!
//! # Example
//!
//! ```
//! use ingest_dedup::DedupConfig;
//! use std::time::Duration;
//!
//! // Defaults only need the dedup field
//! let config = DedupConfig {
//!     query_term: "event_id".into(),
//!     ..Default::default()
//! };
//! assert_eq!(config.poll_interval(), Duration::from_secs(20));
//! assert_eq!(config.max_terms_per_query, 1000);
//! assert!(config.validate().is_ok());
//!
//! // Missing dedup field is rejected
//! assert!(DedupConfig::default().validate().is_err());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::query::BATCH_SIZE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("query_term must name the dedup field")]
    MissingQueryTerm,
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} length {len} is outside {min}..={max}")]
    Length {
        field: &'static str,
        len: usize,
        min: usize,
        max: usize,
    },
    #[error("sts_header_overrides supports at most {max} headers, got {count}")]
    TooManyHeaders { count: usize, max: usize },
}

/// Configuration for the query-before-write coordinator.
///
/// `query_term` has no usable default; everything else does.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Document field whose value identifies duplicates
    #[serde(default)]
    pub query_term: String,

    /// Grace window: minimum age before an unmatched write is promoted
    #[serde(default = "default_query_duration_ms")]
    pub query_duration_ms: u64,

    /// Delay between cycles, also the staleness bound of the backpressure wait
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Backpressure ceiling on documents waiting for a query
    #[serde(default = "default_query_async_document_limit")]
    pub query_async_document_limit: usize,

    /// Keys per query descriptor
    #[serde(default = "default_max_terms_per_query")]
    pub max_terms_per_query: usize,
}

fn default_query_duration_ms() -> u64 { 60_000 }
fn default_poll_interval_ms() -> u64 { 20_000 }
fn default_query_async_document_limit() -> usize { 100_000 }
fn default_max_terms_per_query() -> usize { BATCH_SIZE }

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            query_term: String::new(),
            query_duration_ms: default_query_duration_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            query_async_document_limit: default_query_async_document_limit(),
            max_terms_per_query: default_max_terms_per_query(),
        }
    }
}

impl DedupConfig {
    #[must_use]
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.query_duration_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_term.trim().is_empty() {
            return Err(ConfigError::MissingQueryTerm);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero { field: "poll_interval_ms" });
        }
        if self.max_terms_per_query == 0 {
            return Err(ConfigError::Zero { field: "max_terms_per_query" });
        }
        Ok(())
    }
}

/// Credential options for sinks that talk to AWS-hosted stores.
///
/// Only the shape and bounds live here; resolving credentials from it
/// is the client factory's job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub sts_role_arn: Option<String>,

    #[serde(default)]
    pub sts_header_overrides: HashMap<String, String>,

    #[serde(default)]
    pub sts_external_id: Option<String>,
}

const MAX_STS_HEADER_OVERRIDES: usize = 5;

impl AwsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(region) = &self.region {
            check_len("region", region, 1, usize::MAX)?;
        }
        if let Some(arn) = &self.sts_role_arn {
            check_len("sts_role_arn", arn, 20, 2048)?;
        }
        if self.sts_header_overrides.len() > MAX_STS_HEADER_OVERRIDES {
            return Err(ConfigError::TooManyHeaders {
                count: self.sts_header_overrides.len(),
                max: MAX_STS_HEADER_OVERRIDES,
            });
        }
        if let Some(external_id) = &self.sts_external_id {
            check_len("sts_external_id", external_id, 2, 1224)?;
        }
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ConfigError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ConfigError::Length { field, len, min, max });
    }
    Ok(())
}
