//! Content extraction: one URL in, one [`PageResult`] out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use sitescout_markdown::clean_html;
use sitescout_shared::{AllowList, CrawlConfig, Result};
use tracing::{debug, instrument};
use url::Url;

use crate::renderer::{HttpRenderer, PageRenderer, RenderedPage};
use crate::report::{PageError, PageResult};

/// Href prefixes that never lead to another page.
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:"];

/// Turns a URL into a [`PageResult`]. Never fails: problems become a
/// `failed` result. Content from outside `allow` is never returned.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str, allow: &AllowList, timeout: Duration) -> PageResult;
}

/// Extractor backed by a [`PageRenderer`], cleaning pages with
/// `sitescout-markdown`.
#[derive(Clone)]
pub struct PageExtractor {
    renderer: Arc<dyn PageRenderer>,
}

impl PageExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// Extractor over a plain HTTP renderer.
    pub fn http(config: &CrawlConfig) -> Result<Self> {
        let renderer = HttpRenderer::new(config.user_agent.as_deref())?;
        Ok(Self::new(Arc::new(renderer)))
    }
}

#[async_trait]
impl ContentExtractor for PageExtractor {
    #[instrument(skip_all, fields(url = %url))]
    async fn extract(&self, url: &str, allow: &AllowList, timeout: Duration) -> PageResult {
        let Ok(parsed) = Url::parse(url) else {
            debug!("malformed url");
            return PageResult::failed(url, PageError::FetchError);
        };
        if !allow.admits_url(&parsed) {
            debug!("rejected by allow-list");
            return PageResult::failed(url, PageError::DomainNotAllowed);
        }

        let render = self.renderer.render(&parsed, allow, timeout);
        let rendered = match tokio::time::timeout(timeout, render).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                debug!(error = %e, "render failed");
                return PageResult::failed(url, PageError::from(&e));
            }
            Err(_) => {
                debug!("render timed out");
                return PageResult::failed(url, PageError::Timeout);
            }
        };

        // A renderer may follow redirects on its own.
        if !allow.admits_url(&rendered.final_url) {
            debug!(final_url = %rendered.final_url, "landed outside the allow-list");
            return PageResult::failed(url, PageError::DomainNotAllowed);
        }

        digest(url, &rendered)
    }
}

/// Clean the rendered HTML and collect its links. Kept synchronous since
/// parsed documents are not `Send`.
fn digest(url: &str, rendered: &RenderedPage) -> PageResult {
    let cleaned = clean_html(&rendered.html, Some(&rendered.final_url));
    let links = extract_links(&rendered.html, &rendered.final_url);
    debug!(
        words = cleaned.word_count,
        links = links.len(),
        format = ?cleaned.format,
        "page extracted"
    );
    PageResult::ok(url, cleaned.text, cleaned.title, links)
}

/// Every `<a href>` resolved against `base_url`, fragments removed,
/// duplicates dropped, document order kept.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").expect("static selector");
    let mut links: Vec<String> = Vec::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        let lowered = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || SKIPPED_SCHEMES.iter().any(|s| lowered.starts_with(s))
        {
            continue;
        }

        let Ok(mut resolved) = base_url.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        let resolved = resolved.to_string();
        if !links.contains(&resolved) {
            links.push(resolved);
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderError;
    use crate::report::PageStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticRenderer {
        result: fn(&Url) -> std::result::Result<RenderedPage, RenderError>,
        calls: AtomicUsize,
    }

    impl StaticRenderer {
        fn new(result: fn(&Url) -> std::result::Result<RenderedPage, RenderError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(
            &self,
            url: &Url,
            _scope: &AllowList,
            _timeout: Duration,
        ) -> std::result::Result<RenderedPage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)(url)
        }
    }

    struct HangingRenderer;

    #[async_trait]
    impl PageRenderer for HangingRenderer {
        async fn render(
            &self,
            _url: &Url,
            _scope: &AllowList,
            _timeout: Duration,
        ) -> std::result::Result<RenderedPage, RenderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(RenderError::Fetch("unreachable".into()))
        }
    }

    const PAGE: &str = r##"<html><head><title>Guide</title><script>track()</script></head><body>
        <nav><a href="/home">Home</a></nav>
        <main>
            <h1>Install Guide</h1>
            <p>Run the installer and follow the prompts until everything is done.</p>
            <a href="/docs/next#part-2">Next</a>
            <a href="/docs/next">Next again</a>
            <a href="#top">Top</a>
            <a href="javascript:void(0)">Noop</a>
            <a href="MAILTO:team@example.com">Mail</a>
            <a href="tel:+15555550100">Call</a>
            <a href="https://other.org/ref">Ref</a>
        </main>
    </body></html>"##;

    fn example_com() -> AllowList {
        AllowList::new(["example.com"])
    }

    fn ok_page(url: &Url) -> std::result::Result<RenderedPage, RenderError> {
        Ok(RenderedPage {
            final_url: url.clone(),
            status: 200,
            html: PAGE.to_string(),
        })
    }

    #[test]
    fn links_are_resolved_deduped_and_filtered() {
        let base = Url::parse("https://example.com/docs/intro").unwrap();
        let links = extract_links(PAGE, &base);
        assert_eq!(
            links,
            vec![
                "https://example.com/home",
                "https://example.com/docs/next",
                "https://other.org/ref",
            ]
        );
    }

    #[tokio::test]
    async fn renders_once_and_cleans_content() {
        let renderer = StaticRenderer::new(ok_page);
        let extractor = PageExtractor::new(renderer.clone());

        let page = extractor
            .extract("https://example.com/docs/intro", &example_com(), Duration::from_secs(5))
            .await;

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(page.status, PageStatus::Ok);
        assert_eq!(page.title.as_deref(), Some("Install Guide"));
        assert!(page.content.contains("Run the installer"));
        assert!(!page.content.contains("track()"));
        assert!(!page.content.contains("Home"));
        assert!(page.content_hash.is_some());
        assert_eq!(page.links.len(), 3);
    }

    #[tokio::test]
    async fn render_errors_become_codes() {
        let extractor = PageExtractor::new(StaticRenderer::new(|_| Err(RenderError::Status(404))));
        let page = extractor
            .extract("https://example.com/missing", &example_com(), Duration::from_secs(5))
            .await;
        assert_eq!(page.status, PageStatus::Failed);
        assert_eq!(page.error, Some(PageError::HttpError(404)));
        assert!(page.content.is_empty());

        let extractor = PageExtractor::new(StaticRenderer::new(|_| {
            Err(RenderError::Fetch("connection reset".into()))
        }));
        let page = extractor
            .extract("https://example.com/", &example_com(), Duration::from_secs(5))
            .await;
        assert_eq!(page.error, Some(PageError::FetchError));
    }

    #[tokio::test]
    async fn renderer_that_ignores_timeout_is_cut_off() {
        let extractor = PageExtractor::new(Arc::new(HangingRenderer));
        let page = extractor
            .extract("https://example.com/", &example_com(), Duration::from_millis(50))
            .await;
        assert_eq!(page.error, Some(PageError::Timeout));
    }

    #[tokio::test]
    async fn malformed_url_never_renders() {
        let renderer = StaticRenderer::new(ok_page);
        let extractor = PageExtractor::new(renderer.clone());
        let page = extractor.extract("not a url", &example_com(), Duration::from_secs(1)).await;
        assert_eq!(page.error, Some(PageError::FetchError));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn off_list_url_never_renders() {
        let renderer = StaticRenderer::new(ok_page);
        let extractor = PageExtractor::new(renderer.clone());
        let page = extractor
            .extract("https://other.org/page", &example_com(), Duration::from_secs(1))
            .await;
        assert_eq!(page.error, Some(PageError::DomainNotAllowed));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn landing_outside_the_allow_list_is_rejected() {
        let extractor = PageExtractor::new(StaticRenderer::new(|_| {
            Ok(RenderedPage {
                final_url: Url::parse("https://other.org/landing").unwrap(),
                status: 200,
                html: PAGE.to_string(),
            })
        }));

        let page = extractor
            .extract("https://example.com/moved", &example_com(), Duration::from_secs(5))
            .await;

        assert_eq!(page.status, PageStatus::Failed);
        assert_eq!(page.error, Some(PageError::DomainNotAllowed));
        assert!(page.content.is_empty());
        assert!(page.links.is_empty());
    }

    #[tokio::test]
    async fn http_redirect_to_another_host_yields_no_content() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/p1"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("http://localhost:{port}/secret")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>off-list content</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let extractor = PageExtractor::new(Arc::new(HttpRenderer::new(None).unwrap()));
        let page = extractor
            .extract(
                &format!("{}/p1", server.uri()),
                &AllowList::new(["127.0.0.1"]),
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(page.error, Some(PageError::DomainNotAllowed));
        assert!(!page.content.contains("off-list"));
    }
}
