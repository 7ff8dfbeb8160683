//! Entry normalization
//!
//! Maps one raw, loosely-structured log entry to exactly one flat record.
//! Pure: no I/O, no mutation of the entry or the index. Missing fields
//! degrade to `None` / empty strings - a malformed entry never aborts the
//! batch it arrived in.

use chrono::DateTime;

use crate::models::{NormalizedLogRecord, RawLogEntry};
use crate::tag_index::TagManifestIndex;

/// The fixed upstream timestamp format, e.g.
/// `Fri, 16 May 2025 06:15:07 -0000`.
const LOG_DATETIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Parse an upstream datetime string to epoch seconds.
///
/// `None` on a format mismatch or an empty field; callers keep the record
/// either way.
pub fn parse_log_datetime(datetime: &str) -> Option<i64> {
    match DateTime::parse_from_str(datetime, LOG_DATETIME_FORMAT) {
        Ok(dt) => Some(dt.timestamp()),
        Err(_) => {
            if !datetime.is_empty() {
                tracing::debug!(datetime, "datetime did not match expected format");
            }
            None
        }
    }
}

/// Flatten one raw entry into a normalized record for `repository`.
///
/// Cross-fill is one-directional per entry: a present tag with a missing
/// digest is resolved through the tag map, a present digest with a missing
/// tag takes the first tag listed for that manifest. When both are present
/// they are copied verbatim even if the index disagrees - no reconciliation
/// is attempted.
pub fn normalize(
    repository: &str,
    entry: &RawLogEntry,
    index: &TagManifestIndex,
) -> NormalizedLogRecord {
    let metadata = &entry.metadata;

    let mut tag = non_empty(metadata.tag.clone());
    let mut manifest_digest = non_empty(metadata.manifest_digest.clone());

    match (&tag, &manifest_digest) {
        (Some(t), None) => {
            manifest_digest = index.digest_for_tag(t).map(str::to_string);
        }
        (None, Some(d)) => {
            tag = index.first_tag_for_digest(d).map(str::to_string);
        }
        _ => {}
    }

    let resolved = metadata.resolved_ip.as_ref();

    NormalizedLogRecord {
        timestamp: parse_log_datetime(&entry.datetime),
        repository: repository.to_string(),
        datetime_text: entry.datetime.clone(),
        kind: entry.kind.clone(),
        namespace: non_empty(metadata.namespace.clone()),
        manifest_digest,
        tag,
        provider: resolved.and_then(|r| non_empty(r.provider.clone())),
        service: resolved.and_then(|r| non_empty(r.service.clone())),
        country_code: resolved.and_then(|r| non_empty(r.country_iso_code.clone())),
        continent: resolved.and_then(|r| non_empty(r.continent.clone())),
        aws_region: resolved.and_then(|r| non_empty(r.aws_region.clone())),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawMetadata, ResolvedIp};

    const REPO: &str = "fedora/fedora-bootc";

    fn entry_with_metadata(metadata: RawMetadata) -> RawLogEntry {
        RawLogEntry {
            kind: "pull_repo".to_string(),
            datetime: "Fri, 16 May 2025 06:15:07 -0000".to_string(),
            metadata,
        }
    }

    fn index_with(tag: &str, digest: &str) -> TagManifestIndex {
        let mut index = TagManifestIndex::empty();
        index.insert(tag.to_string(), digest.to_string());
        index
    }

    #[test]
    fn parses_expected_datetime_format() {
        assert_eq!(
            parse_log_datetime("Fri, 16 May 2025 06:15:07 -0000"),
            Some(1747376107)
        );
    }

    #[test]
    fn rejects_other_formats() {
        assert_eq!(parse_log_datetime("not-a-date"), None);
        assert_eq!(parse_log_datetime("2025-05-16T06:15:07Z"), None);
        assert_eq!(parse_log_datetime(""), None);
    }

    #[test]
    fn malformed_datetime_still_produces_record() {
        let mut entry = entry_with_metadata(RawMetadata {
            tag: Some("latest".to_string()),
            ..Default::default()
        });
        entry.datetime = "not-a-date".to_string();

        let record = normalize(REPO, &entry, &TagManifestIndex::empty());
        assert_eq!(record.timestamp, None);
        assert_eq!(record.datetime_text, "not-a-date");
        assert_eq!(record.kind, "pull_repo");
        assert_eq!(record.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn digest_backfilled_from_tag() {
        let entry = entry_with_metadata(RawMetadata {
            tag: Some("v1".to_string()),
            ..Default::default()
        });
        let index = index_with("v1", "sha256:aaa");

        let record = normalize(REPO, &entry, &index);
        assert_eq!(record.manifest_digest.as_deref(), Some("sha256:aaa"));
        assert_eq!(record.tag.as_deref(), Some("v1"));
    }

    #[test]
    fn tag_backfilled_from_digest_takes_first() {
        let entry = entry_with_metadata(RawMetadata {
            manifest_digest: Some("sha256:bbb".to_string()),
            ..Default::default()
        });
        let mut index = TagManifestIndex::empty();
        index.insert("latest".to_string(), "sha256:bbb".to_string());
        index.insert("v2".to_string(), "sha256:bbb".to_string());

        let record = normalize(REPO, &entry, &index);
        assert_eq!(record.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn both_present_copied_verbatim_even_when_index_disagrees() {
        let entry = entry_with_metadata(RawMetadata {
            tag: Some("v1".to_string()),
            manifest_digest: Some("sha256:zzz".to_string()),
            ..Default::default()
        });
        let index = index_with("v1", "sha256:aaa");

        let record = normalize(REPO, &entry, &index);
        assert_eq!(record.tag.as_deref(), Some("v1"));
        assert_eq!(record.manifest_digest.as_deref(), Some("sha256:zzz"));
    }

    #[test]
    fn resolved_ip_attributes_copied_through() {
        let entry = entry_with_metadata(RawMetadata {
            namespace: Some("fedora".to_string()),
            resolved_ip: Some(ResolvedIp {
                provider: Some("aws".to_string()),
                service: Some("ec2".to_string()),
                country_iso_code: Some("US".to_string()),
                continent: Some("NA".to_string()),
                aws_region: Some("us-east-1".to_string()),
            }),
            ..Default::default()
        });

        let record = normalize(REPO, &entry, &TagManifestIndex::empty());
        assert_eq!(record.namespace.as_deref(), Some("fedora"));
        assert_eq!(record.provider.as_deref(), Some("aws"));
        assert_eq!(record.service.as_deref(), Some("ec2"));
        assert_eq!(record.country_code.as_deref(), Some("US"));
        assert_eq!(record.continent.as_deref(), Some("NA"));
        assert_eq!(record.aws_region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn empty_entry_degrades_to_empty_record() {
        let entry = RawLogEntry::default();
        let record = normalize(REPO, &entry, &TagManifestIndex::empty());
        assert_eq!(record.timestamp, None);
        assert_eq!(record.repository, REPO);
        assert_eq!(record.kind, "");
        assert!(record.tag.is_none());
        assert!(record.provider.is_none());
    }
}
