//! Statistics and growth reporting
//!
//! Reporting layer over the store's normalized records and aggregated
//! counts. Everything here is read-only with respect to ingestion state;
//! a reporting failure never affects what has been persisted.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::models::NormalizedLogRecord;
use crate::store::LogStore;

/// Compiled statistics over a set of normalized records.
#[derive(Debug, Serialize)]
pub struct UsageStats {
    pub total_entries: usize,
    pub earliest_event_time: Option<String>,
    pub latest_event_time: Option<String>,
    pub event_kinds: Vec<(String, usize)>,
    pub top_tags: Vec<(String, usize)>,
    pub top_countries: Vec<(String, usize)>,
    pub top_providers: Vec<(String, usize)>,
    pub top_aws_regions: Vec<(String, usize)>,
}

/// Compile breakdowns and top-N rankings from stored records.
pub fn compile_stats(records: &[NormalizedLogRecord], top_n: usize) -> UsageStats {
    let mut kinds: HashMap<String, usize> = HashMap::new();
    let mut tags: HashMap<String, usize> = HashMap::new();
    let mut countries: HashMap<String, usize> = HashMap::new();
    let mut providers: HashMap<String, usize> = HashMap::new();
    let mut regions: HashMap<String, usize> = HashMap::new();
    let mut earliest: Option<i64> = None;
    let mut latest: Option<i64> = None;

    for record in records {
        if !record.kind.is_empty() {
            *kinds.entry(record.kind.clone()).or_default() += 1;
        }
        // Tag popularity only counts actual pulls.
        if record.kind == "pull_repo" {
            if let Some(tag) = &record.tag {
                *tags.entry(tag.clone()).or_default() += 1;
            }
        }
        if let Some(country) = &record.country_code {
            *countries.entry(country.clone()).or_default() += 1;
        }
        if let Some(provider) = &record.provider {
            *providers.entry(provider.clone()).or_default() += 1;
        }
        if let Some(region) = &record.aws_region {
            *regions.entry(region.clone()).or_default() += 1;
        }
        if let Some(ts) = record.timestamp {
            earliest = Some(earliest.map_or(ts, |e: i64| e.min(ts)));
            latest = Some(latest.map_or(ts, |l: i64| l.max(ts)));
        }
    }

    UsageStats {
        total_entries: records.len(),
        earliest_event_time: earliest.map(format_epoch),
        latest_event_time: latest.map(format_epoch),
        event_kinds: ranked(kinds, usize::MAX),
        top_tags: ranked(tags, top_n),
        top_countries: ranked(countries, top_n),
        top_providers: ranked(providers, top_n),
        top_aws_regions: ranked(regions, top_n),
    }
}

/// Sort counters by count descending, then name for a stable order.
fn ranked(counter: HashMap<String, usize>, limit: usize) -> Vec<(String, usize)> {
    let mut entries: Vec<_> = counter.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}

fn format_epoch(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Print compiled statistics, colored for terminals or as JSON.
pub fn display_stats(stats: &UsageStats, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(stats) {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing statistics to JSON: {}", e),
        }
        return;
    }

    println!("\n{}", "=".repeat(80).bright_cyan());
    println!(
        "{}",
        "Quay Usage Report - Stored Log Statistics".bright_white().bold()
    );
    println!("{}", "=".repeat(80).bright_cyan());

    println!(
        "\n{} {} entries • {} to {}\n",
        "📊".bright_yellow(),
        stats.total_entries.to_string().bright_white().bold(),
        stats
            .earliest_event_time
            .as_deref()
            .unwrap_or("n/a")
            .bright_white(),
        stats
            .latest_event_time
            .as_deref()
            .unwrap_or("n/a")
            .bright_white(),
    );

    print_section("Event kinds", &stats.event_kinds);
    print_section("Top pulled tags", &stats.top_tags);
    print_section("Top countries", &stats.top_countries);
    print_section("Top providers", &stats.top_providers);
    print_section("Top AWS regions", &stats.top_aws_regions);
}

fn print_section(title: &str, entries: &[(String, usize)]) {
    println!("{}", title.bright_white().bold());
    if entries.is_empty() {
        println!("   {}", "no data".bright_black());
    }
    for (name, count) in entries {
        println!(
            "   {}: {}",
            name.bright_cyan(),
            count.to_string().bright_green()
        );
    }
    println!();
}

/// Machine-readable monthly growth summary, written for the charting
/// collaborator and tracked alongside the store.
#[derive(Debug, Serialize)]
pub struct GrowthSummary {
    pub last_updated: String,
    pub repositories: BTreeMap<String, RepoGrowth>,
}

#[derive(Debug, Serialize)]
pub struct RepoGrowth {
    pub monthly_pulls: BTreeMap<String, i64>,
    pub total_pulls: i64,
    pub months_tracked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_growth_pct: Option<f64>,
}

impl RepoGrowth {
    fn from_monthly(totals: Vec<(String, i64)>) -> Self {
        let monthly_pulls: BTreeMap<String, i64> = totals.into_iter().collect();
        let total_pulls = monthly_pulls.values().sum();
        let months_tracked = monthly_pulls.len();
        let overall_growth_pct = growth_pct(&monthly_pulls);
        Self {
            monthly_pulls,
            total_pulls,
            months_tracked,
            overall_growth_pct,
        }
    }
}

/// First-to-last month growth percentage, rounded to two decimals. Needs
/// at least two months and a non-zero first month.
fn growth_pct(monthly_pulls: &BTreeMap<String, i64>) -> Option<f64> {
    if monthly_pulls.len() < 2 {
        return None;
    }
    let first = *monthly_pulls.values().next()?;
    let last = *monthly_pulls.values().last()?;
    if first <= 0 {
        return None;
    }
    let pct = (last - first) as f64 / first as f64 * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

/// Build the growth summary for every repository the aggregated table
/// knows about.
pub fn build_growth_summary(store: &LogStore, now: DateTime<Utc>) -> Result<GrowthSummary> {
    let mut repositories = BTreeMap::new();
    for repository in store.aggregated_repositories()? {
        let totals = store.monthly_pull_totals(&repository)?;
        repositories.insert(repository, RepoGrowth::from_monthly(totals));
    }
    Ok(GrowthSummary {
        last_updated: now.to_rfc3339(),
        repositories,
    })
}

/// Write the summary JSON to disk.
pub fn write_growth_summary(summary: &GrowthSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write summary to {}", path.display()))?;
    tracing::info!(path = %path.display(), "growth summary written");
    Ok(())
}

/// Print the monthly growth summary, colored for terminals or as JSON.
pub fn display_growth(summary: &GrowthSummary, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(summary) {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing growth summary to JSON: {}", e),
        }
        return;
    }

    println!("\n{}", "=".repeat(80).bright_cyan());
    println!("{}", "Monthly Pull Growth".bright_white().bold());
    println!("{}", "=".repeat(80).bright_cyan());

    for (repository, growth) in &summary.repositories {
        println!("\n{} {}", "🔹".bright_blue(), repository.bright_white().bold());
        println!(
            "   Total pulls: {}",
            growth.total_pulls.to_string().bright_green().bold()
        );
        if let Some(pct) = growth.overall_growth_pct {
            let arrow = if pct > 0.0 { "📈" } else if pct < 0.0 { "📉" } else { "➡️" };
            println!(
                "   Growth: {} {}",
                format!("{:+.1}%", pct).bright_yellow().bold(),
                arrow
            );
        }
        println!("   Monthly breakdown:");
        for (month, pulls) in &growth.monthly_pulls {
            println!(
                "     {}: {}",
                month.bright_cyan(),
                pulls.to_string().bright_white()
            );
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull(ts: Option<i64>, tag: Option<&str>, country: Option<&str>) -> NormalizedLogRecord {
        NormalizedLogRecord {
            timestamp: ts,
            repository: "fedora/fedora-bootc".to_string(),
            datetime_text: String::new(),
            kind: "pull_repo".to_string(),
            namespace: None,
            manifest_digest: None,
            tag: tag.map(str::to_string),
            provider: None,
            service: None,
            country_code: country.map(str::to_string),
            continent: None,
            aws_region: None,
        }
    }

    #[test]
    fn compiles_breakdowns_and_time_range() {
        let records = vec![
            pull(Some(100), Some("latest"), Some("US")),
            pull(Some(300), Some("latest"), Some("DE")),
            pull(Some(200), Some("v1"), Some("US")),
            pull(None, None, None),
        ];
        let stats = compile_stats(&records, 10);

        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.event_kinds, vec![("pull_repo".to_string(), 4)]);
        assert_eq!(stats.top_tags[0], ("latest".to_string(), 2));
        assert_eq!(stats.top_countries[0], ("US".to_string(), 2));
        assert_eq!(
            stats.earliest_event_time.as_deref(),
            Some("1970-01-01T00:01:40+00:00")
        );
        assert_eq!(
            stats.latest_event_time.as_deref(),
            Some("1970-01-01T00:05:00+00:00")
        );
    }

    #[test]
    fn top_n_truncates_after_ranking() {
        let records = vec![
            pull(Some(1), Some("a"), None),
            pull(Some(2), Some("a"), None),
            pull(Some(3), Some("b"), None),
            pull(Some(4), Some("c"), None),
        ];
        let stats = compile_stats(&records, 2);
        assert_eq!(
            stats.top_tags,
            vec![("a".to_string(), 2), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn non_pull_events_do_not_count_tags() {
        let mut record = pull(Some(1), Some("latest"), None);
        record.kind = "push_repo".to_string();
        let stats = compile_stats(&[record], 10);
        assert!(stats.top_tags.is_empty());
        assert_eq!(stats.event_kinds, vec![("push_repo".to_string(), 1)]);
    }

    #[test]
    fn growth_pct_needs_two_months_and_nonzero_base() {
        let one: BTreeMap<String, i64> = [("2025-04".to_string(), 10)].into();
        assert_eq!(growth_pct(&one), None);

        let zero_base: BTreeMap<String, i64> =
            [("2025-04".to_string(), 0), ("2025-05".to_string(), 10)].into();
        assert_eq!(growth_pct(&zero_base), None);

        let two: BTreeMap<String, i64> =
            [("2025-04".to_string(), 200), ("2025-05".to_string(), 350)].into();
        assert_eq!(growth_pct(&two), Some(75.0));
    }

    #[test]
    fn repo_growth_totals_months() {
        let growth = RepoGrowth::from_monthly(vec![
            ("2025-04".to_string(), 25),
            ("2025-05".to_string(), 40),
        ]);
        assert_eq!(growth.total_pulls, 65);
        assert_eq!(growth.months_tracked, 2);
        assert_eq!(growth.overall_growth_pct, Some(60.0));
    }
}
