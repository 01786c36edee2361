//! llms.txt manifest discovery.
//!
//! Before (or while) crawling a site, SiteScout checks whether the site
//! publishes an `llms.txt` manifest (per <https://llmstxt.org/>). A manifest is
//! curated, AI-oriented content, so callers rank it ahead of crawled pages.
//!
//! Absence is the common case: every failure (non-2xx, timeout, oversize body,
//! content that is not an llms.txt) is reported as `None`, never as an error.

mod parser;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sitescout_shared::{AllowList, Result, SiteScoutError, site_root};
use tracing::{debug, info, instrument};
use url::Url;

pub use parser::{ManifestDoc, ManifestLink, ManifestSection, parse_manifest};

/// Well-known manifest path probed at each site root.
pub const MANIFEST_PATH: &str = "/llms.txt";

/// Maximum number of redirects to follow when fetching the manifest. Only
/// hops that stay on the probed site's host are followed.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for the manifest request.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum response size we consider valid (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("SiteScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A manifest found at a site root.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// `scheme://host[:port]` the manifest belongs to.
    pub site_root: String,
    /// Full URL the manifest was fetched from.
    pub url: String,
    /// Raw manifest text.
    pub content: String,
    /// Parsed structure.
    pub doc: ManifestDoc,
}

impl Manifest {
    /// Entry URLs resolved against the manifest URL.
    pub fn entry_urls(&self) -> Vec<String> {
        match Url::parse(&self.url) {
            Ok(base) => self.doc.resolved_urls(&base),
            Err(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Probe trait
// ---------------------------------------------------------------------------

/// Anything that can look up the manifest for a site root.
#[async_trait]
pub trait ManifestProbe: Send + Sync {
    /// Probe `site_root` for a manifest. Any URL on the site may be passed;
    /// only its origin is used.
    async fn discover_manifest(&self, site_root: &Url) -> Option<Manifest>;
}

// ---------------------------------------------------------------------------
// HTTP discoverer
// ---------------------------------------------------------------------------

/// Configuration for [`ManifestDiscoverer`].
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for the manifest request in seconds.
    pub timeout_secs: u64,
    /// User-Agent override.
    pub user_agent: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }
}

/// Probes `<origin>/llms.txt` over HTTP. One request per call.
#[derive(Debug, Clone)]
pub struct ManifestDiscoverer {
    client: Client,
}

impl ManifestDiscoverer {
    /// Build a discoverer with its own HTTP client.
    pub fn new(opts: &DiscoveryOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(opts.user_agent.as_deref().unwrap_or(USER_AGENT))
            .redirect(same_site_redirects())
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| SiteScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManifestProbe for ManifestDiscoverer {
    #[instrument(skip_all, fields(site = %site))]
    async fn discover_manifest(&self, site: &Url) -> Option<Manifest> {
        let Some(root) = site_root(site) else {
            debug!("not an http(s) site root, skipping manifest probe");
            return None;
        };
        let manifest_url = format!("{root}{MANIFEST_PATH}");

        let content = match fetch_manifest(&self.client, &manifest_url).await {
            Ok(content) => content,
            Err(e) => {
                debug!(url = %manifest_url, error = %e, "no manifest");
                return None;
            }
        };

        let doc = match parse_manifest(&content) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(url = %manifest_url, error = %e, "manifest did not parse");
                return None;
            }
        };

        info!(
            url = %manifest_url,
            title = %doc.title,
            sections = doc.sections.len(),
            links = doc.links().count(),
            "manifest discovered"
        );

        Some(Manifest {
            site_root: root,
            url: manifest_url,
            content,
            doc,
        })
    }
}

/// Follow redirects only to the host that was probed (`www.` folded). An
/// off-site hop stops the chain, leaving a 3xx that reads as "no manifest".
fn same_site_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let same_site = attempt.previous().first().is_some_and(|origin| {
            AllowList::from_start_urls([origin.as_str()]).admits_url(attempt.url())
        });
        if same_site {
            attempt.follow()
        } else {
            debug!(to = %attempt.url(), "manifest redirect leaves the site");
            attempt.stop()
        }
    })
}

/// Fetch the manifest body, rejecting non-2xx and oversized responses.
async fn fetch_manifest(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SiteScoutError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteScoutError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(SiteScoutError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| SiteScoutError::Network(format!("{url}: failed to read body: {e}")))?;

    if body.len() as u64 > MAX_RESPONSE_SIZE {
        return Err(SiteScoutError::validation(format!(
            "{url}: response too large ({} bytes)",
            body.len()
        )));
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST: &str = "# Example Docs\n\n> Docs for tests.\n\n## Guides\n\n- [Intro](/guides/intro): Start here\n- [FAQ](https://other.example.org/faq)\n";

    fn discoverer() -> ManifestDiscoverer {
        ManifestDiscoverer::new(&DiscoveryOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn finds_manifest_at_site_root() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .expect(1)
            .mount(&server)
            .await;

        // A deep URL still probes the origin.
        let site = Url::parse(&format!("{}/docs/page?x=1", server.uri())).unwrap();
        let manifest = discoverer().discover_manifest(&site).await.expect("manifest");

        assert_eq!(manifest.site_root, server.uri());
        assert_eq!(manifest.url, format!("{}/llms.txt", server.uri()));
        assert_eq!(manifest.doc.title, "Example Docs");
        assert_eq!(
            manifest.entry_urls(),
            vec![
                format!("{}/guides/intro", server.uri()),
                "https://other.example.org/faq".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn same_site_redirect_is_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(ResponseTemplate::new(301).insert_header("Location", "/docs/llms.txt"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/llms.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .expect(1)
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        let manifest = discoverer().discover_manifest(&site).await.expect("manifest");
        assert_eq!(manifest.doc.title, "Example Docs");
    }

    #[tokio::test]
    async fn redirect_to_another_host_is_none() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("http://localhost:{port}/moved/llms.txt")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved/llms.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .expect(0)
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        assert!(discoverer().discover_manifest(&site).await.is_none());
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        assert!(discoverer().discover_manifest(&site).await.is_none());
    }

    #[tokio::test]
    async fn html_fallback_page_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<!doctype html><html><body>Not here</body></html>"),
            )
            .mount(&server)
            .await;

        let site = Url::parse(&server.uri()).unwrap();
        assert!(discoverer().discover_manifest(&site).await.is_none());
    }

    #[tokio::test]
    async fn slow_server_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/llms.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(MANIFEST)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let probe = ManifestDiscoverer::new(&DiscoveryOptions {
            timeout_secs: 1,
            user_agent: None,
        })
        .unwrap();
        let site = Url::parse(&server.uri()).unwrap();
        assert!(probe.discover_manifest(&site).await.is_none());
    }

    #[tokio::test]
    async fn non_http_site_is_none() {
        let site = Url::parse("file:///srv/www").unwrap();
        assert!(discoverer().discover_manifest(&site).await.is_none());
    }
}
