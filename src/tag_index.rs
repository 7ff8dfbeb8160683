//! Tag/manifest cross-reference index
//!
//! Built once per repository at the start of an ingestion run by paging
//! through the tag-listing endpoint, then consulted by the normalizer to
//! backfill whichever of tag / manifest digest an entry is missing. The
//! index is best-effort: when the build fails the pipeline proceeds with
//! an empty index and records simply stay un-enriched.

use std::collections::HashMap;

use crate::api::{ApiError, RegistryLogSource};

/// Two mappings covering all tags the upstream currently knows for a
/// repository: tag name to manifest digest (one digest per tag, last seen
/// wins) and manifest digest to its tags in listing order.
#[derive(Debug, Clone, Default)]
pub struct TagManifestIndex {
    tag_to_digest: HashMap<String, String>,
    digest_to_tags: HashMap<String, Vec<String>>,
}

impl TagManifestIndex {
    /// An index with no entries; enrichment becomes a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Page through the tag endpoint until the upstream reports no further
    /// page. Any request failure aborts the whole build; the caller decides
    /// whether to degrade to [`TagManifestIndex::empty`].
    pub async fn build<S: RegistryLogSource>(
        source: &S,
        repository: &str,
        page_size: u32,
    ) -> Result<Self, ApiError> {
        let mut index = Self::default();
        let mut page_number = 1u32;

        loop {
            let page = source.tags_page(repository, page_number, page_size).await?;
            for tag in page.tags {
                // Tags without a digest cannot cross-reference anything.
                let Some(digest) = tag.manifest_digest else {
                    continue;
                };
                if digest.is_empty() || tag.name.is_empty() {
                    continue;
                }
                index.insert(tag.name, digest);
            }
            if !page.has_additional {
                break;
            }
            page_number += 1;
        }

        tracing::debug!(
            repository,
            tags = index.tag_to_digest.len(),
            manifests = index.digest_to_tags.len(),
            pages = page_number,
            "built tag/manifest index"
        );
        Ok(index)
    }

    pub(crate) fn insert(&mut self, tag: String, digest: String) {
        self.tag_to_digest.insert(tag.clone(), digest.clone());
        let tags = self.digest_to_tags.entry(digest).or_default();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    pub fn digest_for_tag(&self, tag: &str) -> Option<&str> {
        self.tag_to_digest.get(tag).map(String::as_str)
    }

    /// First tag listed for a manifest. Deterministic but arbitrary when
    /// several tags alias one manifest.
    pub fn first_tag_for_digest(&self, digest: &str) -> Option<&str> {
        self.digest_to_tags
            .get(digest)
            .and_then(|tags| tags.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tag_to_digest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(pairs: &[(&str, &str)]) -> TagManifestIndex {
        let mut index = TagManifestIndex::default();
        for (tag, digest) in pairs {
            index.insert(tag.to_string(), digest.to_string());
        }
        index
    }

    #[test]
    fn lookups_go_both_ways() {
        let index = index_of(&[("v1", "sha256:aaa"), ("latest", "sha256:bbb")]);
        assert_eq!(index.digest_for_tag("v1"), Some("sha256:aaa"));
        assert_eq!(index.first_tag_for_digest("sha256:bbb"), Some("latest"));
        assert_eq!(index.digest_for_tag("v9"), None);
    }

    #[test]
    fn first_tag_is_listing_order() {
        let index = index_of(&[("latest", "sha256:bbb"), ("v2", "sha256:bbb")]);
        assert_eq!(index.first_tag_for_digest("sha256:bbb"), Some("latest"));
    }

    #[test]
    fn repeated_tag_last_seen_wins() {
        let index = index_of(&[("v1", "sha256:aaa"), ("v1", "sha256:ccc")]);
        assert_eq!(index.digest_for_tag("v1"), Some("sha256:ccc"));
    }

    #[test]
    fn empty_index_is_inert() {
        let index = TagManifestIndex::empty();
        assert!(index.is_empty());
        assert_eq!(index.digest_for_tag("v1"), None);
        assert_eq!(index.first_tag_for_digest("sha256:aaa"), None);
    }
}
