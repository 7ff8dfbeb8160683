//! Durable log store
//!
//! SQLite-backed persistence for normalized log records and aggregated
//! daily counts. The composite identity `(timestamp, repository)` is
//! enforced by a unique index and duplicates are silently ignored, so
//! re-running ingestion over an overlapping window is always safe - the
//! store doubles as the pipeline's checkpoint.
//!
//! A connection is opened, used, and closed per logical operation; no
//! transaction spans repositories, so a failure while processing one
//! repository never blocks or rolls back another.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::models::{AggregatedCount, InsertSummary, NormalizedLogRecord};

/// Records with an unparsable datetime carry no timestamp. They all map to
/// the same identity slot per repository, mirroring the upstream tool this
/// store replaced; only the first such record survives. The sentinel keeps
/// them apart from real epoch values inside the unique index.
const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS pull_logs (
    timestamp       INTEGER,
    repository      TEXT NOT NULL,
    datetime_text   TEXT NOT NULL DEFAULT '',
    kind            TEXT NOT NULL DEFAULT '',
    namespace       TEXT,
    manifest_digest TEXT,
    tag             TEXT,
    provider        TEXT,
    service         TEXT,
    country_code    TEXT,
    continent       TEXT,
    aws_region      TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_pull_logs_identity
    ON pull_logs (IFNULL(timestamp, -1), repository);
CREATE INDEX IF NOT EXISTS idx_pull_logs_timestamp
    ON pull_logs (timestamp);
CREATE INDEX IF NOT EXISTS idx_pull_logs_repo_tag
    ON pull_logs (repository, tag);

CREATE TABLE IF NOT EXISTS aggregated_counts (
    date          TEXT NOT NULL,
    repository    TEXT NOT NULL,
    kind          TEXT NOT NULL,
    count         INTEGER NOT NULL DEFAULT 0,
    datetime_text TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (date, repository, kind)
);
"#;

/// Handle on the store file. Cheap to clone around; every operation opens
/// its own connection and bootstraps the schema idempotently.
#[derive(Debug, Clone)]
pub struct LogStore {
    db_path: PathBuf,
}

impl LogStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("failed to open store at {}", self.db_path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("failed to bootstrap store schema")?;
        Ok(conn)
    }

    /// Insert a batch of normalized records.
    ///
    /// Each record succeeds or is counted as a duplicate independently; one
    /// conflict never aborts its siblings. Duplicate rejection is silent by
    /// design - an overlapping fetch window re-delivers entries the store
    /// already holds.
    pub fn insert_batch(&self, records: &[NormalizedLogRecord]) -> Result<InsertSummary> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut summary = InsertSummary::default();
        let mut unparsable_skipped = 0usize;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pull_logs (
                    timestamp, repository, datetime_text, kind, namespace,
                    manifest_digest, tag, provider, service, country_code,
                    continent, aws_region
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for record in records {
                let changed = stmt.execute(params![
                    record.timestamp,
                    record.repository,
                    record.datetime_text,
                    record.kind,
                    record.namespace,
                    record.manifest_digest,
                    record.tag,
                    record.provider,
                    record.service,
                    record.country_code,
                    record.continent,
                    record.aws_region,
                ])?;
                if changed == 1 {
                    summary.inserted += 1;
                } else {
                    summary.duplicates += 1;
                    if record.timestamp.is_none() {
                        unparsable_skipped += 1;
                    }
                }
            }
        }
        tx.commit()?;

        if unparsable_skipped > 0 {
            // Distinct unparsable entries collapse onto one identity slot
            // per repository; surfaced here rather than silently dropped.
            tracing::warn!(
                skipped = unparsable_skipped,
                "entries without a parsable timestamp were dropped as duplicates"
            );
        }
        tracing::debug!(
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "insert batch committed"
        );
        Ok(summary)
    }

    /// Newest committed timestamp for a repository, if any. Records without
    /// a parsed timestamp never contribute.
    pub fn max_timestamp(&self, repository: &str) -> Result<Option<i64>> {
        let conn = self.open()?;
        let max = conn.query_row(
            "SELECT MAX(timestamp) FROM pull_logs WHERE repository = ?1",
            params![repository],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(max)
    }

    /// Faithful dump of every stored record, newest first, then by
    /// repository. Records without a timestamp sort last.
    pub fn all_records(&self) -> Result<Vec<NormalizedLogRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM pull_logs
             ORDER BY timestamp DESC, repository ASC"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read records")
    }

    /// Records filtered by repository and/or an inclusive timestamp range.
    pub fn records_between(
        &self,
        repository: Option<&str>,
        since: Option<i64>,
        until: Option<i64>,
    ) -> Result<Vec<NormalizedLogRecord>> {
        let conn = self.open()?;
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM pull_logs WHERE 1=1");
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(repo) = repository {
            sql.push_str(&format!(" AND repository = ?{}", values.len() + 1));
            values.push(repo.to_string().into());
        }
        if let Some(since) = since {
            sql.push_str(&format!(" AND timestamp >= ?{}", values.len() + 1));
            values.push(since.into());
        }
        if let Some(until) = until {
            sql.push_str(&format!(" AND timestamp <= ?{}", values.len() + 1));
            values.push(until.into());
        }
        sql.push_str(" ORDER BY timestamp DESC, repository ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), row_to_record)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read records")
    }

    /// Merge aggregated daily counts, dedup-keyed on (date, repository,
    /// kind). Existing rows win; re-fetching an overlapping range is a
    /// no-op for days already recorded.
    pub fn merge_aggregated(&self, rows: &[AggregatedCount]) -> Result<InsertSummary> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut summary = InsertSummary::default();

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO aggregated_counts
                     (date, repository, kind, count, datetime_text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                let changed = stmt.execute(params![
                    row.date,
                    row.repository,
                    row.kind,
                    row.count,
                    row.datetime_text,
                ])?;
                if changed == 1 {
                    summary.inserted += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    /// Monthly pull totals for one repository, oldest month first.
    pub fn monthly_pull_totals(&self, repository: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT substr(date, 1, 7) AS month, SUM(count)
             FROM aggregated_counts
             WHERE repository = ?1 AND kind = 'pull_repo' AND date != ''
             GROUP BY month
             ORDER BY month ASC",
        )?;
        let rows = stmt.query_map(params![repository], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read monthly totals")
    }

    /// Repositories present in the aggregated-counts table.
    pub fn aggregated_repositories(&self) -> Result<Vec<String>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT repository FROM aggregated_counts ORDER BY repository",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list repositories")
    }
}

const RECORD_COLUMNS: &str = "timestamp, repository, datetime_text, kind, namespace, \
     manifest_digest, tag, provider, service, country_code, continent, aws_region";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NormalizedLogRecord> {
    Ok(NormalizedLogRecord {
        timestamp: row.get(0)?,
        repository: row.get(1)?,
        datetime_text: row.get(2)?,
        kind: row.get(3)?,
        namespace: row.get(4)?,
        manifest_digest: row.get(5)?,
        tag: row.get(6)?,
        provider: row.get(7)?,
        service: row.get(8)?,
        country_code: row.get(9)?,
        continent: row.get(10)?,
        aws_region: row.get(11)?,
    })
}
