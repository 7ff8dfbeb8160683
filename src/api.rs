//! Registry API client and pagination
//!
//! Everything that talks HTTP lives here: the bearer-token client, the
//! typed error taxonomy, the continuation-token cursor, and the fetch loop
//! that drains a repository's log window page by page.
//!
//! ## Pagination protocol
//!
//! The log endpoint is continuation-token based. The first request carries
//! the window bounds (and a page-size limit); every response may include an
//! opaque `next_page` token. While a token is present the next request
//! carries ONLY that token - the upstream remembers the original window and
//! filter context behind it, and merging fresh window parameters with a
//! token is a protocol violation. Pagination ends when a response has no
//! token. The tag endpoint is unrelated and uses explicit page numbers.
//!
//! ## Failure policy
//!
//! Any transport failure, non-2xx status, or undecodable body aborts the
//! fetch in progress and surfaces as an [`ApiError`]; pages accumulated
//! before the failure are discarded by the caller. Whether an entry is
//! already durable is the store's call, not the fetcher's.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{AggregatedEntry, AggregatedPage, LogsPage, RawLogEntry, TagsPage};
use crate::window::FetchWindow;

/// Errors surfaced by upstream API calls.
///
/// Per-entry data problems (an unparsable datetime, a missing field) are
/// NOT errors - they are absorbed during normalization. These variants all
/// abort the operation that raised them.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure before an HTTP status was obtained.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 401: the bearer token was rejected.
    #[error("credential rejected by the registry (401); check the API token")]
    Unauthorized,

    /// 403: insufficient permission, or the upstream rejected the
    /// time-range parameters.
    #[error("access denied by the registry (403); insufficient permission or malformed time range")]
    Forbidden,

    /// Any other non-2xx response.
    #[error("registry returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// The body was not valid JSON for the expected shape.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
}

/// Continuation state of a paginated log request. Advances strictly
/// forward: window first, then token after token until the upstream stops
/// supplying one.
#[derive(Debug, Clone)]
pub enum PageCursor {
    /// Initial request: carries the window bounds.
    Window(FetchWindow),
    /// Follow-up request: carries only the opaque token.
    Token(String),
}

impl PageCursor {
    /// Next cursor after a response, or `None` when pagination is done.
    pub fn advance(self, next_page: Option<String>) -> Option<PageCursor> {
        match next_page {
            Some(token) if !token.is_empty() => Some(PageCursor::Token(token)),
            _ => None,
        }
    }
}

/// The upstream endpoints the ingestion pipeline consumes.
///
/// [`QuayClient`] is the production implementation; tests script the pages
/// to exercise pagination and failure behavior without a network.
#[async_trait]
pub trait RegistryLogSource: Send + Sync {
    /// One page of usage logs for a repository.
    async fn logs_page(&self, repository: &str, cursor: &PageCursor) -> Result<LogsPage, ApiError>;

    /// One page of the tag listing for a repository.
    async fn tags_page(
        &self,
        repository: &str,
        page: u32,
        limit: u32,
    ) -> Result<TagsPage, ApiError>;

    /// Pre-summarized daily counts for a repository and window.
    async fn aggregated_logs(
        &self,
        repository: &str,
        window: &FetchWindow,
    ) -> Result<Vec<AggregatedEntry>, ApiError>;
}

/// Bearer-token client for a Quay-compatible registry API.
pub struct QuayClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    page_size: u32,
}

impl QuayClient {
    pub fn new(base_url: &str, token: &str, page_size: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            page_size,
        }
    }

    fn repository_url(&self, repository: &str, endpoint: &str) -> String {
        format!("{}/repository/{}/{}", self.base_url, repository, endpoint)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        match status.as_u16() {
            401 => return Err(ApiError::Unauthorized),
            403 => return Err(ApiError::Forbidden),
            s if !status.is_success() => {
                return Err(ApiError::Status { status: s, url });
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ApiError::MalformedResponse {
                url,
                reason: source.to_string(),
            })
    }
}

#[async_trait]
impl RegistryLogSource for QuayClient {
    async fn logs_page(&self, repository: &str, cursor: &PageCursor) -> Result<LogsPage, ApiError> {
        let url = self.repository_url(repository, "logs");
        let query = match cursor {
            PageCursor::Window(window) => vec![
                ("starttime", window.start_param()),
                ("endtime", window.end_param()),
                ("limit", self.page_size.to_string()),
            ],
            // The token stands in for the whole original query.
            PageCursor::Token(token) => vec![("next_page", token.clone())],
        };
        self.get_json(url, &query).await
    }

    async fn tags_page(
        &self,
        repository: &str,
        page: u32,
        limit: u32,
    ) -> Result<TagsPage, ApiError> {
        let url = self.repository_url(repository, "tag/");
        let query = vec![("limit", limit.to_string()), ("page", page.to_string())];
        self.get_json(url, &query).await
    }

    async fn aggregated_logs(
        &self,
        repository: &str,
        window: &FetchWindow,
    ) -> Result<Vec<AggregatedEntry>, ApiError> {
        let url = self.repository_url(repository, "aggregatelogs");
        let query = vec![
            ("starttime", window.start_param()),
            ("endtime", window.end_param()),
        ];
        let page: AggregatedPage = self.get_json(url, &query).await?;
        Ok(page.aggregated)
    }
}

/// Drain every page of a repository's log window.
///
/// Returns the union of all pages' entries, in upstream order but with no
/// ordering guarantee; duplicate suppression across overlapping windows is
/// the store's job. Errors abort the whole fetch - no partial result is
/// ever returned as success.
pub async fn fetch_window_logs<S: RegistryLogSource>(
    source: &S,
    repository: &str,
    window: &FetchWindow,
) -> Result<Vec<RawLogEntry>, ApiError> {
    let mut entries = Vec::new();
    let mut cursor = PageCursor::Window(window.clone());
    let mut pages = 0u32;

    loop {
        let page = source.logs_page(repository, &cursor).await?;
        pages += 1;
        tracing::debug!(
            repository,
            page = pages,
            entries = page.logs.len(),
            has_next = page.next_page.is_some(),
            "fetched log page"
        );
        entries.extend(page.logs);

        match cursor.advance(page.next_page) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    tracing::info!(repository, pages, entries = entries.len(), "log fetch complete");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advances_on_token() {
        let window = FetchWindow {
            start: chrono::Utc::now() - chrono::Duration::days(1),
            end: chrono::Utc::now(),
        };
        let cursor = PageCursor::Window(window);
        match cursor.advance(Some("tok-1".to_string())) {
            Some(PageCursor::Token(token)) => assert_eq!(token, "tok-1"),
            other => panic!("expected token cursor, got {other:?}"),
        }
    }

    #[test]
    fn cursor_terminates_without_token() {
        let cursor = PageCursor::Token("tok-1".to_string());
        assert!(cursor.advance(None).is_none());
    }

    #[test]
    fn cursor_treats_empty_token_as_terminal() {
        let cursor = PageCursor::Token("tok-1".to_string());
        assert!(cursor.advance(Some(String::new())).is_none());
    }
}
