//! Domain-restricted batch crawling.
//!
//! This crate provides:
//! - [`renderer`]: the [`PageRenderer`] boundary and a plain HTTP implementation
//! - [`extractor`]: one URL → one [`PageResult`] with cleaned text and links
//! - [`orchestrator`]: concurrent, allow-list-checked batch crawls
//! - [`report`]: [`CrawlRequest`], [`CrawlReport`] and friends

pub mod extractor;
pub mod orchestrator;
pub mod renderer;
pub mod report;

pub use extractor::{ContentExtractor, PageExtractor, extract_links};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use renderer::{HttpRenderer, PageRenderer, RenderError, RenderedPage};
pub use report::{
    CrawlReport, CrawlRequest, DEFAULT_MAX_LINKS_PER_PAGE, ManifestSource, PageError, PageResult,
    PageStatus, Source, SourceKind,
};
