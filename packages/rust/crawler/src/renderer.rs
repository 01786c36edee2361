//! Page rendering boundary.
//!
//! [`PageRenderer`] is the only place a fetch-and-render engine plugs in. The
//! bundled [`HttpRenderer`] does a plain HTTP GET; a headless browser would
//! implement the same trait.
//!
//! Renderers receive the crawl's [`AllowList`] and must not load a document
//! (including a redirect target) from a host it rejects.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use sitescout_shared::{AllowList, Result, SiteScoutError};
use tracing::debug;
use url::Url;

use crate::report::PageError;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("SiteScout/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 5;

/// Bodies larger than this are refused (10 MB).
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// A rendered document.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL after redirects; relative links resolve against it.
    pub final_url: Url,
    pub status: u16,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A redirect pointed at a host outside the allow-list.
    #[error("redirected outside the allow-list: {0}")]
    OffList(Url),
}

impl From<&RenderError> for PageError {
    fn from(err: &RenderError) -> Self {
        match err {
            RenderError::Timeout => PageError::Timeout,
            RenderError::Status(code) => PageError::HttpError(*code),
            RenderError::Fetch(_) => PageError::FetchError,
            RenderError::OffList(_) => PageError::DomainNotAllowed,
        }
    }
}

/// Fetch and render one URL, staying inside `scope`.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        url: &Url,
        scope: &AllowList,
        timeout: Duration,
    ) -> std::result::Result<RenderedPage, RenderError>;
}

// ---------------------------------------------------------------------------
// HTTP renderer
// ---------------------------------------------------------------------------

/// Static HTML fetch over reqwest. No JavaScript execution.
///
/// Redirects are followed by hand (at most five) so each hop can be checked
/// against the scope before it is requested.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(user_agent: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or(USER_AGENT))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SiteScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url`, following in-scope redirects. The whole chain shares one
    /// time budget.
    async fn fetch(
        &self,
        url: &Url,
        scope: &AllowList,
        timeout: Duration,
    ) -> std::result::Result<(Url, Response), RenderError> {
        let deadline = Instant::now() + timeout;
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RenderError::Timeout);
            }
            let response = self
                .client
                .get(current.as_str())
                .timeout(remaining)
                .send()
                .await
                .map_err(classify)?;

            let Some(next) = redirect_target(&current, &response) else {
                return Ok((current, response));
            };
            if hops == MAX_REDIRECTS {
                return Err(RenderError::Fetch(format!(
                    "too many redirects (max {MAX_REDIRECTS})"
                )));
            }
            if !scope.admits_url(&next) {
                debug!(from = %current, to = %next, "redirect leaves the allow-list");
                return Err(RenderError::OffList(next));
            }
            debug!(from = %current, to = %next, "following redirect");
            hops += 1;
            current = next;
        }
    }
}

/// Where a 3xx response points, resolved against the URL that produced it.
fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

fn classify(err: reqwest::Error) -> RenderError {
    if err.is_timeout() {
        RenderError::Timeout
    } else {
        RenderError::Fetch(err.to_string())
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(
        &self,
        url: &Url,
        scope: &AllowList,
        timeout: Duration,
    ) -> std::result::Result<RenderedPage, RenderError> {
        debug!(%url, "fetching page");

        let (final_url, response) = self.fetch(url, scope, timeout).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_BODY_SIZE as u64 {
                return Err(RenderError::Fetch(format!(
                    "response too large ({len} bytes, max {MAX_BODY_SIZE})"
                )));
            }
        }

        let html = response.text().await.map_err(classify)?;
        if html.len() > MAX_BODY_SIZE {
            return Err(RenderError::Fetch(format!(
                "response too large ({} bytes)",
                html.len()
            )));
        }

        Ok(RenderedPage {
            final_url,
            status: status.as_u16(),
            html,
        })
    }
}
