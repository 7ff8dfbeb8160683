//! Store export
//!
//! Faithful dumps of the persisted records, ordered newest first and then
//! by repository. CSV quoting follows RFC 4180: fields containing commas,
//! quotes, or line breaks are quoted, with embedded quotes doubled.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::NormalizedLogRecord;
use crate::store::LogStore;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

const CSV_HEADER: &str = "timestamp,repository,datetime_text,kind,namespace,manifest_digest,\
tag,provider,service,country_code,continent,aws_region";

/// Dump every stored record to `writer` in the requested format.
pub fn export_records(
    records: &[NormalizedLogRecord],
    format: ExportFormat,
    writer: &mut impl Write,
) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(records, writer),
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, records)
                .context("failed to serialize records to JSON")?;
            writeln!(writer)?;
            Ok(())
        }
    }
}

/// Export the whole store to a file, or stdout when `output` is `None`.
pub fn export_store(store: &LogStore, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    let records = store.all_records()?;
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            export_records(&records, format, &mut writer)?;
            writer.flush()?;
            tracing::info!(records = records.len(), path = %path.display(), "export written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            export_records(&records, format, &mut handle)?;
        }
    }
    Ok(())
}

fn write_csv(records: &[NormalizedLogRecord], writer: &mut impl Write) -> Result<()> {
    writeln!(writer, "{}", CSV_HEADER)?;
    for record in records {
        let timestamp = record
            .timestamp
            .map(|ts| ts.to_string())
            .unwrap_or_default();
        let fields = [
            timestamp.as_str(),
            record.repository.as_str(),
            record.datetime_text.as_str(),
            record.kind.as_str(),
            record.namespace.as_deref().unwrap_or(""),
            record.manifest_digest.as_deref().unwrap_or(""),
            record.tag.as_deref().unwrap_or(""),
            record.provider.as_deref().unwrap_or(""),
            record.service.as_deref().unwrap_or(""),
            record.country_code.as_deref().unwrap_or(""),
            record.continent.as_deref().unwrap_or(""),
            record.aws_region.as_deref().unwrap_or(""),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        writeln!(writer, "{}", row.join(","))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: Option<i64>, datetime_text: &str) -> NormalizedLogRecord {
        NormalizedLogRecord {
            timestamp,
            repository: "fedora/fedora-bootc".to_string(),
            datetime_text: datetime_text.to_string(),
            kind: "pull_repo".to_string(),
            namespace: Some("fedora".to_string()),
            manifest_digest: None,
            tag: Some("latest".to_string()),
            provider: None,
            service: None,
            country_code: None,
            continent: None,
            aws_region: None,
        }
    }

    #[test]
    fn csv_quotes_embedded_commas_and_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field(""), "");
    }

    #[test]
    fn csv_dump_includes_header_and_rows() {
        let records = vec![record(Some(100), "Fri, 16 May 2025 06:15:07 -0000")];
        let mut out = Vec::new();
        export_records(&records, ExportFormat::Csv, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert!(row.starts_with("100,fedora/fedora-bootc,"));
        // The datetime itself contains commas, so it must be quoted.
        assert!(row.contains("\"Fri, 16 May 2025 06:15:07 -0000\""));
    }

    #[test]
    fn missing_timestamp_exports_as_empty_field() {
        let records = vec![record(None, "not-a-date")];
        let mut out = Vec::new();
        export_records(&records, ExportFormat::Csv, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with(",fedora/fedora-bootc,"));
    }

    #[test]
    fn json_dump_round_trips() {
        let records = vec![record(Some(100), "x")];
        let mut out = Vec::new();
        export_records(&records, ExportFormat::Json, &mut out).unwrap();

        let parsed: Vec<NormalizedLogRecord> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, records);
    }
}
