//! Progress records written by source crawlers.
//!
//! Records are stored as JSON with an `@class` discriminator naming the
//! worker shape. Unknown discriminators fail to deserialize.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Progress of one crawler work partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@class")]
pub enum WorkerProgressState {
    /// Page-by-page crawl over a listing API
    #[serde(rename = "pagination_crawler")]
    PaginationCrawler(PaginationCrawlerProgress),
    /// Time-windowed crawl with a resume marker
    #[serde(rename = "crowdstrike")]
    CrowdStrike(CrowdStrikeProgress),
}

impl WorkerProgressState {
    /// Discriminator written to `@class`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PaginationCrawler(_) => "pagination_crawler",
            Self::CrowdStrike(_) => "crowdstrike",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationCrawlerProgress {
    pub total_items: u64,
    pub loaded_items: u64,
    pub export_start_time: Option<DateTime<Utc>>,
    pub item_ids: Vec<String>,
    pub key_attributes: BTreeMap<String, Value>,
}

impl PaginationCrawlerProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.loaded_items >= self.total_items
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrowdStrikeProgress {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Resume token for the next page, absent on the first request
    pub marker: Option<String>,
}
