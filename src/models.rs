//! Core Data Models
//!
//! This module defines the data structures used throughout the ingestion
//! pipeline, from raw upstream log entries to the flat records persisted in
//! the store.
//!
//! ## Data Flow
//!
//! 1. **Wire shapes**: [`LogsPage`], [`RawLogEntry`] - deserialized straight
//!    from the registry's log endpoint, tolerant of missing fields
//! 2. **Normalization**: [`NormalizedLogRecord`] - one flat record per raw
//!    entry, produced by the normalizer and persisted by the store
//! 3. **Tag listing**: [`TagsPage`], [`TagEntry`] - the page-numbered tag
//!    endpoint feeding the tag/manifest index
//! 4. **Aggregates**: [`AggregatedPage`], [`AggregatedEntry`] - the
//!    pre-summarized daily counts consumed by the growth report
//!
//! ## Tolerance
//!
//! Every wire field uses `#[serde(default)]` or `Option`: the upstream
//! omits fields freely and an absent field must never fail a batch. The
//! only required identity on a [`NormalizedLogRecord`] is the
//! `(timestamp, repository)` pair, and even `timestamp` may be `None` when
//! the source datetime string does not parse.

use serde::{Deserialize, Serialize};

/// One raw log entry as returned by `GET /repository/{repo}/logs`.
///
/// Read-only view of upstream data; the normalizer copies what it needs and
/// never mutates the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLogEntry {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub datetime: String,
    #[serde(default)]
    pub metadata: RawMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub manifest_digest: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub resolved_ip: Option<ResolvedIp>,
}

/// Upstream IP-resolution attributes nested under `metadata.resolved_ip`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedIp {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub country_iso_code: Option<String>,
    #[serde(default)]
    pub continent: Option<String>,
    #[serde(default)]
    pub aws_region: Option<String>,
}

/// One page of the paginated log endpoint.
///
/// `next_page` is an opaque continuation token. When present, the next
/// request carries the token and nothing else - the upstream remembers the
/// original window and filters behind it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsPage {
    #[serde(default)]
    pub logs: Vec<RawLogEntry>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One page of `GET /repository/{repo}/tag/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsPage {
    #[serde(default)]
    pub tags: Vec<TagEntry>,
    #[serde(default)]
    pub has_additional: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub manifest_digest: Option<String>,
}

/// Response of `GET /repository/{repo}/aggregatelogs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregatedPage {
    #[serde(default)]
    pub aggregated: Vec<AggregatedEntry>,
}

/// One pre-summarized daily/kind-bucketed count from the aggregate endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedEntry {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub datetime: String,
}

/// The flat record the pipeline persists, one per raw log entry.
///
/// `(timestamp, repository)` is the composite identity used for duplicate
/// rejection. `timestamp` is `None` when the source datetime did not match
/// the expected format; such records are still stored, but all of them for
/// a given repository share one identity slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLogRecord {
    pub timestamp: Option<i64>,
    pub repository: String,
    /// Original textual timestamp, kept verbatim for auditing.
    pub datetime_text: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub manifest_digest: Option<String>,
    pub tag: Option<String>,
    pub provider: Option<String>,
    pub service: Option<String>,
    pub country_code: Option<String>,
    pub continent: Option<String>,
    pub aws_region: Option<String>,
}

impl NormalizedLogRecord {
    /// Date portion (`YYYY-MM-DD`, UTC) of the parsed timestamp, if any.
    pub fn date(&self) -> Option<String> {
        let ts = self.timestamp?;
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
    }
}

/// Outcome of one store insertion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// One row of the aggregated-counts table, derived from an
/// [`AggregatedEntry`] by resolving its datetime to a calendar date.
///
/// `(date, repository, kind)` is the merge identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCount {
    pub date: String,
    pub repository: String,
    pub kind: String,
    pub count: i64,
    pub datetime_text: String,
}
