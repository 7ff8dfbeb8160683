//! Ingestion pipeline
//!
//! Drives the fetch-normalize-persist cycle for each configured repository,
//! strictly sequentially: window planning, paginated log fetch, best-effort
//! tag/manifest index build, normalization, deduplicating insert. A
//! repository's failure is recorded in its outcome and never aborts the
//! repositories that follow it.

use anyhow::Result;
use chrono::Utc;

use crate::api::{fetch_window_logs, ApiError, RegistryLogSource};
use crate::models::AggregatedCount;
use crate::normalizer::{normalize, parse_log_datetime};
use crate::store::LogStore;
use crate::tag_index::TagManifestIndex;
use crate::window::{FetchWindow, WindowOverrides, WindowPlanner};

/// Knobs the ingest run needs beyond the client itself.
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub planner: WindowPlanner,
    pub tag_page_size: u32,
}

/// Successful per-repository ingest summary.
#[derive(Debug, Clone)]
pub struct RepoIngestReport {
    pub repository: String,
    pub window: FetchWindow,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// False when the tag index build failed and enrichment was skipped.
    pub enriched: bool,
}

/// Result of one repository's cycle within a multi-repository run.
#[derive(Debug)]
pub struct RepoIngestOutcome {
    pub repository: String,
    pub result: Result<RepoIngestReport, ApiError>,
}

/// Run the ingestion cycle for every repository in order.
///
/// Upstream failures are isolated per repository; store failures are local
/// faults and abort the whole run.
pub async fn run_ingest<S: RegistryLogSource>(
    source: &S,
    store: &LogStore,
    repositories: &[String],
    overrides: &WindowOverrides,
    settings: &IngestSettings,
) -> Result<Vec<RepoIngestOutcome>> {
    let mut outcomes = Vec::with_capacity(repositories.len());

    for repository in repositories {
        let result = ingest_repository(source, store, repository, overrides, settings).await?;
        outcomes.push(RepoIngestOutcome {
            repository: repository.clone(),
            result,
        });
    }

    Ok(outcomes)
}

async fn ingest_repository<S: RegistryLogSource>(
    source: &S,
    store: &LogStore,
    repository: &str,
    overrides: &WindowOverrides,
    settings: &IngestSettings,
) -> Result<Result<RepoIngestReport, ApiError>> {
    let max_stored = store.max_timestamp(repository)?;
    let window = settings.planner.plan(max_stored, overrides, Utc::now());
    tracing::info!(repository, window = %window, resumed = max_stored.is_some(), "starting ingest");

    let raw_entries = match fetch_window_logs(source, repository, &window).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!(repository, error = %err, "log fetch failed; skipping repository");
            return Ok(Err(err));
        }
    };

    // Enrichment is best-effort: a failed index build downgrades to an
    // empty index instead of failing the repository.
    let (index, enriched) =
        match TagManifestIndex::build(source, repository, settings.tag_page_size).await {
            Ok(index) => (index, true),
            Err(err) => {
                tracing::warn!(
                    repository,
                    error = %err,
                    "tag index unavailable; records will not be cross-filled"
                );
                (TagManifestIndex::empty(), false)
            }
        };

    let records: Vec<_> = raw_entries
        .iter()
        .map(|entry| normalize(repository, entry, &index))
        .collect();

    let summary = store.insert_batch(&records)?;
    tracing::info!(
        repository,
        fetched = records.len(),
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        "repository ingest complete"
    );

    Ok(Ok(RepoIngestReport {
        repository: repository.to_string(),
        window,
        fetched: records.len(),
        inserted: summary.inserted,
        duplicates: summary.duplicates,
        enriched,
    }))
}

/// Successful per-repository growth-fetch summary.
#[derive(Debug, Clone)]
pub struct RepoGrowthReport {
    pub repository: String,
    pub window: FetchWindow,
    pub fetched: usize,
    pub merged: usize,
    pub duplicates: usize,
    pub total_pulls: i64,
}

/// Result of one repository's aggregate fetch within a growth run.
#[derive(Debug)]
pub struct RepoGrowthOutcome {
    pub repository: String,
    pub result: Result<RepoGrowthReport, ApiError>,
}

/// Fetch pre-aggregated daily counts for each repository over `window` and
/// merge them into the store, dedup-keyed on (date, repository, kind).
/// Same isolation rules as [`run_ingest`].
pub async fn run_growth_fetch<S: RegistryLogSource>(
    source: &S,
    store: &LogStore,
    repositories: &[String],
    window: &FetchWindow,
) -> Result<Vec<RepoGrowthOutcome>> {
    let mut outcomes = Vec::with_capacity(repositories.len());

    for repository in repositories {
        let entries = match source.aggregated_logs(repository, window).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(repository, error = %err, "aggregate fetch failed; skipping repository");
                outcomes.push(RepoGrowthOutcome {
                    repository: repository.clone(),
                    result: Err(err),
                });
                continue;
            }
        };

        let rows: Vec<AggregatedCount> = entries
            .iter()
            .map(|entry| AggregatedCount {
                date: aggregated_date(&entry.datetime),
                repository: repository.clone(),
                kind: entry.kind.clone(),
                count: entry.count,
                datetime_text: entry.datetime.clone(),
            })
            .collect();

        let total_pulls = entries
            .iter()
            .filter(|e| e.kind == "pull_repo")
            .map(|e| e.count)
            .sum();

        let summary = store.merge_aggregated(&rows)?;
        tracing::info!(
            repository,
            fetched = rows.len(),
            merged = summary.inserted,
            duplicates = summary.duplicates,
            "aggregate merge complete"
        );

        outcomes.push(RepoGrowthOutcome {
            repository: repository.clone(),
            result: Ok(RepoGrowthReport {
                repository: repository.clone(),
                window: window.clone(),
                fetched: rows.len(),
                merged: summary.inserted,
                duplicates: summary.duplicates,
                total_pulls,
            }),
        });
    }

    Ok(outcomes)
}

/// Calendar date of an aggregated entry; empty when the datetime does not
/// parse, matching the raw-record behavior.
fn aggregated_date(datetime: &str) -> String {
    parse_log_datetime(datetime)
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_date_resolves_calendar_day() {
        assert_eq!(
            aggregated_date("Fri, 16 May 2025 00:00:00 -0000"),
            "2025-05-16"
        );
        assert_eq!(aggregated_date("garbage"), "");
        assert_eq!(aggregated_date(""), "");
    }
}
