//! Page cleaning: rendered HTML → readable text.
//!
//! Picks the main content region of a page, converts it to Markdown with the
//! `htmd` crate, and runs a series of cleanup passes. Pages whose Markdown is
//! too thin fall back to whitespace-normalized plain text of the same region.
//! Scripts, styles, and navigation chrome never reach the output.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

/// Markdown shorter than this (in characters) is considered a failed conversion.
pub const MIN_MARKDOWN_CHARS: usize = 50;

/// Tags whose contents are never part of page text.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "nav", "header", "footer",
    "aside", "form", "button",
];

/// Main-content containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &[
    "main article",
    "main",
    "article",
    r#"[role="main"]"#,
    ".content",
    "#content",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// How [`CleanedPage::text`] is formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextFormat {
    Markdown,
    PlainText,
}

/// Result of cleaning one HTML document.
#[derive(Debug, Clone)]
pub struct CleanedPage {
    /// Cleaned page text (empty when the page has no visible text).
    pub text: String,
    /// First `<h1>`, falling back to `<title>`.
    pub title: Option<String>,
    /// Format of `text`.
    pub format: TextFormat,
    /// Approximate word count, excluding fenced code.
    pub word_count: usize,
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Clean a rendered HTML document. `base_url` resolves relative links in the
/// Markdown output.
#[instrument(skip_all, fields(url = base_url.map(Url::as_str).unwrap_or("-")))]
pub fn clean_html(html: &str, base_url: Option<&Url>) -> CleanedPage {
    let doc = Html::parse_document(html);
    let title = page_title(&doc);
    let region = content_region(&doc);

    let markdown = region
        .map(|el| to_markdown(&el.inner_html(), base_url))
        .unwrap_or_default();

    let (text, format) = if markdown.trim().chars().count() >= MIN_MARKDOWN_CHARS {
        (markdown, TextFormat::Markdown)
    } else {
        let plain = region.map(visible_text).unwrap_or_default();
        if plain.is_empty() && !markdown.trim().is_empty() {
            (markdown, TextFormat::Markdown)
        } else {
            debug!(markdown_len = markdown.len(), "markdown too thin, using plain text");
            (plain, TextFormat::PlainText)
        }
    };

    let word_count = count_words(&text);
    CleanedPage {
        text,
        title,
        format,
        word_count,
    }
}

/// Collapse all runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn content_region(doc: &Html) -> Option<ElementRef<'_>> {
    CONTENT_SELECTORS
        .iter()
        .find_map(|css| doc.select(&selector(css)).next())
        .or_else(|| doc.select(&selector("body")).next())
}

fn page_title(doc: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|css| {
        doc.select(&selector(css))
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

fn to_markdown(content_html: &str, base_url: Option<&Url>) -> String {
    let content_html = tables_to_markdown(content_html);
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(CHROME_TAGS.to_vec())
        .build();

    match converter.convert(&content_html) {
        Ok(raw) => cleanup::run_pipeline(&raw, base_url),
        Err(e) => {
            debug!(error = %e, "htmd conversion failed");
            String::new()
        }
    }
}

/// Visible text of an element, skipping chrome subtrees.
fn visible_text(region: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in region.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| CHROME_TAGS.contains(&el.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    normalize_whitespace(&out)
}

/// `htmd` drops table structure, so tables are rewritten to Markdown first.
fn tables_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let table_sel = selector("table");
    let row_sel = selector("tr");
    let cell_sel = selector("th, td");

    let mut result = html.to_string();
    for table in fragment.select(&table_sel) {
        let rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .map(|tr| {
                tr.select(&cell_sel)
                    .map(|cell| normalize_whitespace(&cell.text().collect::<String>()))
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            continue;
        }

        let mut md = String::from("\n\n");
        md.push_str(&table_row(&rows[0], columns));
        md.push_str(&table_row(&vec!["---".to_string(); columns], columns));
        for row in &rows[1..] {
            md.push_str(&table_row(row, columns));
        }
        md.push('\n');

        result = result.replacen(&table.html(), &md, 1);
    }
    result
}

fn table_row(cells: &[String], columns: usize) -> String {
    let mut padded = cells.to_vec();
    padded.resize(columns, String::new());
    format!("| {} |\n", padded.join(" | "))
}

fn count_words(text: &str) -> usize {
    static FENCED_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    FENCED_RE
        .replace_all(text, " ")
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
