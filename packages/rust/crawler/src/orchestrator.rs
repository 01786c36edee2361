//! Crawl orchestration.
//!
//! Checks every requested URL against the allow-list, fans admitted URLs out
//! to the extractor, probes each site root for a manifest alongside, and folds everything into a [`CrawlReport`] once all tasks have
//! settled. One URL's failure (or panic) never affects another's result.
//!
//! Page extractions and manifest probes draw from one semaphore, so a batch
//! never has more than `concurrency` requests in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use sitescout_discovery::{DiscoveryOptions, Manifest, ManifestDiscoverer, ManifestProbe};
use sitescout_shared::{AllowList, CrawlConfig, Result, site_root};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::extractor::{ContentExtractor, PageExtractor};
use crate::report::{CrawlReport, CrawlRequest, ManifestSource, PageError, PageResult, SourceKind};

/// Tuning knobs for [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum simultaneous extractions and manifest probes, combined.
    pub concurrency: usize,
    /// Per-URL budget, counted from when the URL gets its permit.
    pub timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&CrawlConfig> for OrchestratorOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            concurrency: config.concurrency as usize,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Runs crawl batches.
#[derive(Clone)]
pub struct Orchestrator {
    extractor: Arc<dyn ContentExtractor>,
    probe: Option<Arc<dyn ManifestProbe>>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Orchestrator without manifest discovery.
    pub fn new(extractor: Arc<dyn ContentExtractor>, options: OrchestratorOptions) -> Self {
        Self {
            extractor,
            probe: None,
            options,
        }
    }

    /// Probe each distinct site root in a batch with `probe`.
    pub fn with_manifest_probe(mut self, probe: Arc<dyn ManifestProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// HTTP extractor plus HTTP manifest discovery, configured from `config`.
    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        let extractor = PageExtractor::http(config)?;
        let discoverer = ManifestDiscoverer::new(&DiscoveryOptions {
            user_agent: config.user_agent.clone(),
            ..DiscoveryOptions::default()
        })?;
        Ok(Self::new(Arc::new(extractor), OrchestratorOptions::from(config))
            .with_manifest_probe(Arc::new(discoverer)))
    }

    /// Attempt every URL in `request` once and report every outcome.
    #[instrument(skip_all, fields(urls = request.urls.len(), concurrency = self.options.concurrency))]
    pub async fn crawl(&self, request: &CrawlRequest) -> CrawlReport {
        let start_time = Instant::now();
        let allow = Arc::new(AllowList::new(&request.allowed_domains));
        if allow.is_empty() {
            warn!("allow-list is empty, every URL will be rejected");
        }

        // Request order is fixed here; duplicates keep their first slot.
        let mut pages: IndexMap<String, Option<PageResult>> = IndexMap::new();
        let mut admitted: Vec<String> = Vec::new();
        let mut roots: IndexSet<String> = IndexSet::new();

        for url in &request.urls {
            if pages.contains_key(url) {
                debug!(%url, "duplicate url in request");
                continue;
            }
            let parsed = Url::parse(url.trim()).ok();
            let is_admitted = parsed.as_ref().is_some_and(|u| allow.admits_url(u));
            if !is_admitted {
                debug!(%url, "rejected by allow-list");
                pages.insert(
                    url.clone(),
                    Some(PageResult::failed(url.as_str(), PageError::DomainNotAllowed)),
                );
                continue;
            }
            if let Some(root) = parsed.as_ref().and_then(site_root) {
                roots.insert(root);
            }
            pages.insert(url.clone(), None);
            admitted.push(url.clone());
        }

        info!(
            admitted = admitted.len(),
            rejected = pages.len() - admitted.len(),
            site_roots = roots.len(),
            "starting crawl"
        );

        let permits = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let manifest_tasks = match (&self.probe, request.discover_manifests) {
            (Some(probe), true) => Some(spawn_manifest_probes(probe, &roots, &permits)),
            _ => None,
        };

        let mut tasks = self.spawn_extractions(admitted, &allow, &permits);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, page)) => {
                    if let Some(slot) = pages.get_mut(&url) {
                        *slot = Some(page);
                    }
                }
                Err(e) => warn!(error = %e, "extraction task failed"),
            }
        }

        let manifests = match manifest_tasks {
            Some(tasks) => collect_manifests(tasks, roots.len(), &allow).await,
            None => Vec::new(),
        };

        let report = assemble(pages, &allow, request.max_links_per_page, manifests);

        info!(
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            links = report.links().len(),
            manifests = report.manifests().len(),
            duration_ms = start_time.elapsed().as_millis(),
            "crawl completed"
        );

        report
    }

    fn spawn_extractions(
        &self,
        urls: Vec<String>,
        allow: &Arc<AllowList>,
        permits: &Arc<Semaphore>,
    ) -> JoinSet<(String, PageResult)> {
        let timeout = self.options.timeout;
        let mut tasks = JoinSet::new();

        for url in urls {
            let sem = permits.clone();
            let allow = allow.clone();
            let extractor = self.extractor.clone();
            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return (url.clone(), PageResult::failed(url, PageError::FetchError));
                };

                let extraction = extractor.extract(&url, &allow, timeout);
                let page = match tokio::time::timeout(timeout, extraction).await {
                    Ok(page) => page,
                    Err(_) => {
                        warn!(%url, timeout_ms = timeout.as_millis(), "extraction timed out");
                        PageResult::failed(url.as_str(), PageError::Timeout)
                    }
                };
                if let Some(error) = &page.error {
                    warn!(%url, %error, "page failed");
                }
                (url, page)
            });
        }

        tasks
    }
}

fn spawn_manifest_probes(
    probe: &Arc<dyn ManifestProbe>,
    roots: &IndexSet<String>,
    permits: &Arc<Semaphore>,
) -> JoinSet<(usize, Option<Manifest>)> {
    let mut tasks = JoinSet::new();
    for (index, root) in roots.iter().enumerate() {
        let Ok(root_url) = Url::parse(root) else {
            continue;
        };
        let probe = probe.clone();
        let sem = permits.clone();
        tasks.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return (index, None);
            };
            (index, probe.discover_manifest(&root_url).await)
        });
    }
    tasks
}

/// Wait for every probe and return found manifests in site-root order.
async fn collect_manifests(
    mut tasks: JoinSet<(usize, Option<Manifest>)>,
    root_count: usize,
    allow: &AllowList,
) -> Vec<ManifestSource> {
    let mut found: Vec<Option<Manifest>> = vec![None; root_count];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, manifest)) => {
                if let Some(slot) = found.get_mut(index) {
                    *slot = manifest;
                }
            }
            Err(e) => warn!(error = %e, "manifest probe task failed"),
        }
    }

    found
        .into_iter()
        .flatten()
        .map(|manifest| {
            let entry_urls = manifest
                .entry_urls()
                .into_iter()
                .filter(|u| allow.admits(u))
                .collect();
            ManifestSource {
                kind: SourceKind::Manifest,
                site_root: manifest.site_root,
                url: manifest.url,
                title: manifest.doc.title,
                summary: manifest.doc.summary,
                content: manifest.content,
                entry_urls,
            }
        })
        .collect()
}

/// Filter and cap each page's links, merge them, and build the report.
fn assemble(
    pages: IndexMap<String, Option<PageResult>>,
    allow: &AllowList,
    max_links_per_page: usize,
    manifests: Vec<ManifestSource>,
) -> CrawlReport {
    let mut all_links: IndexSet<String> = IndexSet::new();

    let pages: IndexMap<String, PageResult> = pages
        .into_iter()
        .map(|(url, slot)| {
            let mut page = slot.unwrap_or_else(|| {
                // The task panicked before producing a result.
                PageResult::failed(url.as_str(), PageError::FetchError)
            });
            if page.is_ok() {
                page.links = page
                    .links
                    .into_iter()
                    .filter(|link| allow.admits(link))
                    .take(max_links_per_page)
                    .collect();
                all_links.extend(page.links.iter().cloned());
            }
            (url, page)
        })
        .collect();

    CrawlReport::new(pages, all_links.into_iter().collect(), manifests)
}
