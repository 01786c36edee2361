//! Crawl request and report types.
//!
//! A [`CrawlReport`] holds one [`PageResult`] per requested URL, in request
//! order, whether the page was fetched or not. Failures are data here, not
//! errors: a report is always produced.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default cap on links kept per page.
pub const DEFAULT_MAX_LINKS_PER_PAGE: usize = 50;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One crawl batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Absolute URLs to attempt, each at most once.
    pub urls: Vec<String>,
    /// Domains the crawl may touch. Empty admits nothing.
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_max_links")]
    pub max_links_per_page: usize,
    #[serde(default = "default_true")]
    pub discover_manifests: bool,
}

fn default_max_links() -> usize {
    DEFAULT_MAX_LINKS_PER_PAGE
}

fn default_true() -> bool {
    true
}

impl CrawlRequest {
    pub fn new<U, D>(urls: U, allowed_domains: D) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            allowed_domains: allowed_domains.into_iter().map(Into::into).collect(),
            max_links_per_page: DEFAULT_MAX_LINKS_PER_PAGE,
            discover_manifests: true,
        }
    }

    pub fn with_max_links(mut self, max_links_per_page: usize) -> Self {
        self.max_links_per_page = max_links_per_page;
        self
    }

    pub fn with_manifests(mut self, discover_manifests: bool) -> Self {
        self.discover_manifests = discover_manifests;
        self
    }
}

// ---------------------------------------------------------------------------
// Page results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Ok,
    Failed,
}

/// Why a page has no content. Serialized as its code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PageError {
    /// Rejected by the allow-list; never fetched.
    DomainNotAllowed,
    Timeout,
    /// Non-2xx response.
    HttpError(u16),
    /// Anything else that kept the page from rendering.
    FetchError,
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainNotAllowed => f.write_str("domain-not-allowed"),
            Self::Timeout => f.write_str("timeout"),
            Self::HttpError(code) => write!(f, "http-error:{code}"),
            Self::FetchError => f.write_str("fetch-error"),
        }
    }
}

impl FromStr for PageError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain-not-allowed" => Ok(Self::DomainNotAllowed),
            "timeout" => Ok(Self::Timeout),
            "fetch-error" => Ok(Self::FetchError),
            other => other
                .strip_prefix("http-error:")
                .and_then(|code| code.parse().ok())
                .map(Self::HttpError)
                .ok_or_else(|| format!("unknown page error code: {other}")),
        }
    }
}

impl From<PageError> for String {
    fn from(err: PageError) -> Self {
        err.to_string()
    }
}

impl TryFrom<String> for PageError {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Outcome of one attempted URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub status: PageStatus,
    /// Cleaned page text; empty for failed pages.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Outbound links in document order.
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
    /// SHA-256 of `content`, hex encoded. Only set for ok pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl PageResult {
    pub fn ok(
        url: impl Into<String>,
        content: String,
        title: Option<String>,
        links: Vec<String>,
    ) -> Self {
        let content_hash = Some(compute_hash(&content));
        Self {
            url: url.into(),
            status: PageStatus::Ok,
            content,
            title,
            links,
            error: None,
            content_hash,
            fetched_at: Utc::now(),
        }
    }

    pub fn failed(url: impl Into<String>, error: PageError) -> Self {
        Self {
            url: url.into(),
            status: PageStatus::Failed,
            content: String::new(),
            title: None,
            links: Vec::new(),
            error: Some(error),
            content_hash: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == PageStatus::Ok
    }
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a piece of evidence came from. Manifests rank ahead of pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Manifest,
    Page,
}

/// An `llms.txt` manifest found during the crawl.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestSource {
    pub kind: SourceKind,
    pub site_root: String,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub content: String,
    /// Manifest entries that pass the allow-list.
    pub entry_urls: Vec<String>,
}

/// Borrowed view of one piece of evidence in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'a> {
    pub kind: SourceKind,
    pub url: &'a str,
    pub title: Option<&'a str>,
    pub content: &'a str,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one crawl batch. Built once by the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pages: IndexMap<String, PageResult>,
    links: Vec<String>,
    manifests: Vec<ManifestSource>,
}

impl CrawlReport {
    pub(crate) fn new(
        pages: IndexMap<String, PageResult>,
        links: Vec<String>,
        manifests: Vec<ManifestSource>,
    ) -> Self {
        Self {
            pages,
            links,
            manifests,
        }
    }

    /// Requested URL → result, in request order.
    pub fn pages(&self) -> &IndexMap<String, PageResult> {
        &self.pages
    }

    pub fn page(&self, url: &str) -> Option<&PageResult> {
        self.pages.get(url)
    }

    /// Admissible links across all pages, first occurrence wins.
    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn manifests(&self) -> &[ManifestSource] {
        &self.manifests
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.values().filter(|p| p.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.values().filter(|p| !p.is_ok())
    }

    /// Manifests first, then successfully fetched pages in request order.
    pub fn sources(&self) -> Vec<Source<'_>> {
        let manifests = self.manifests.iter().map(|m| Source {
            kind: SourceKind::Manifest,
            url: &m.url,
            title: Some(&m.title),
            content: &m.content,
        });
        let pages = self.succeeded().map(|p| Source {
            kind: SourceKind::Page,
            url: &p.url,
            title: p.title.as_deref(),
            content: &p.content,
        });
        manifests.chain(pages).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_strings() {
        assert_eq!(PageError::HttpError(404).to_string(), "http-error:404");
        assert_eq!("http-error:503".parse::<PageError>(), Ok(PageError::HttpError(503)));
        assert_eq!("timeout".parse::<PageError>(), Ok(PageError::Timeout));
        assert!("http-error:abc".parse::<PageError>().is_err());
        assert!("nope".parse::<PageError>().is_err());
    }

    #[test]
    fn failed_page_serializes_error_code() {
        let page = PageResult::failed("https://b.com/p2", PageError::DomainNotAllowed);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "domain-not-allowed");
        assert_eq!(json["content"], "");
        assert!(json.get("content_hash").is_none());
    }

    #[test]
    fn ok_page_hashes_content() {
        let page = PageResult::ok("https://a.com/", "hello world".into(), None, vec![]);
        assert_eq!(
            page.content_hash.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        assert!(page.error.is_none());
    }

    #[test]
    fn request_defaults_apply_when_deserializing() {
        let request: CrawlRequest =
            serde_json::from_str(r#"{"urls":["https://a.com/"],"allowed_domains":["a.com"]}"#)
                .unwrap();
        assert_eq!(request.max_links_per_page, DEFAULT_MAX_LINKS_PER_PAGE);
        assert!(request.discover_manifests);
    }

    #[test]
    fn sources_list_manifests_before_pages() {
        let mut pages = IndexMap::new();
        pages.insert(
            "https://a.com/p1".to_string(),
            PageResult::ok("https://a.com/p1", "body".into(), Some("P1".into()), vec![]),
        );
        pages.insert(
            "https://a.com/p2".to_string(),
            PageResult::failed("https://a.com/p2", PageError::Timeout),
        );
        let manifest = ManifestSource {
            kind: SourceKind::Manifest,
            site_root: "https://a.com".into(),
            url: "https://a.com/llms.txt".into(),
            title: "A".into(),
            summary: None,
            content: "# A\n".into(),
            entry_urls: vec![],
        };
        let report = CrawlReport::new(pages, vec![], vec![manifest]);

        let sources = report.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].kind, SourceKind::Manifest);
        assert_eq!(sources[1].url, "https://a.com/p1");
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failed().count(), 1);
    }
}
