//! Crawl results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One discovered URL belonging to a scan job.
///
/// Rows form an append-only, unordered set per job; display order is a
/// presentation concern (`created_at` descending), not arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    /// Server-side row id; absent on payloads that do not serialize it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
