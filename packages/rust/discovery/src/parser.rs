//! llms.txt manifest parser.
//!
//! Accepts the format described at <https://llmstxt.org/>:
//! - `# Title` as the first non-blank line (required)
//! - optional `> summary` blockquote lines
//! - `## Section` headings
//! - link lines `- [Name](href)` with optional `: notes`
//!
//! Sites in the wild also list bare URLs one per line, so a line that is just
//! an absolute URL or a root-relative path is accepted as an entry too.

use std::sync::LazyLock;

use regex::Regex;
use sitescout_shared::{Result, SiteScoutError};
use url::Url;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parsed llms.txt document.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDoc {
    /// The H1 title.
    pub title: String,
    /// Joined blockquote summary, if any.
    pub summary: Option<String>,
    /// Sections in document order. Links before the first `##` land in an
    /// untitled leading section.
    pub sections: Vec<ManifestSection>,
}

/// A `##` section and its links.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestSection {
    /// Heading text; `None` for links listed before any heading.
    pub title: Option<String>,
    pub links: Vec<ManifestLink>,
}

/// One linked entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestLink {
    pub name: String,
    /// Target as written in the file (may be relative).
    pub href: String,
    pub notes: Option<String>,
}

impl ManifestDoc {
    /// All links across sections, in document order.
    pub fn links(&self) -> impl Iterator<Item = &ManifestLink> {
        self.sections.iter().flat_map(|s| s.links.iter())
    }

    /// Resolve every link against `base` (normally the manifest URL).
    /// Unresolvable hrefs are skipped.
    pub fn resolved_urls(&self, base: &Url) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for link in self.links() {
            let Ok(mut resolved) = base.join(&link.href) else {
                continue;
            };
            resolved.set_fragment(None);
            let resolved = resolved.to_string();
            if !urls.contains(&resolved) {
                urls.push(resolved);
            }
        }
        urls
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("H1 regex"));

static H2_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^##\s+(.+)$").expect("H2 regex"));

static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^>\s*(.*)$").expect("blockquote regex"));

/// `- [Name](href)` or `- [Name](href): notes`; the list marker is optional.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*+]\s+)?\[([^\]]+)\]\(([^)\s]+)\)(?::\s*(.*))?$").expect("link regex")
});

static BARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[-*+]\s+)?((?:https?://|/)\S+)$").expect("bare url regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse llms.txt content. Fails when the file is empty or does not open with an H1.
pub fn parse_manifest(content: &str) -> Result<ManifestDoc> {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());

    let first = lines
        .next()
        .ok_or_else(|| SiteScoutError::parse("llms.txt is empty"))?;
    let title = match H1_RE.captures(first) {
        Some(caps) => caps[1].trim().to_string(),
        _ => {
            return Err(SiteScoutError::parse(
                "llms.txt must start with an H1 heading (# Title)",
            ));
        }
    };

    let mut summary: Vec<&str> = Vec::new();
    let mut in_preamble = true;
    let mut sections: Vec<ManifestSection> = Vec::new();
    let mut current = ManifestSection {
        title: None,
        links: Vec::new(),
    };

    for line in lines {
        if in_preamble {
            if let Some(caps) = QUOTE_RE.captures(line) {
                let text = caps.get(1).map_or("", |m| m.as_str().trim());
                if !text.is_empty() {
                    summary.push(text);
                }
                continue;
            }
            in_preamble = false;
        }

        if let Some(caps) = H2_RE.captures(line) {
            let finished = std::mem::replace(
                &mut current,
                ManifestSection {
                    title: Some(caps[1].trim().to_string()),
                    links: Vec::new(),
                },
            );
            if finished.title.is_some() || !finished.links.is_empty() {
                sections.push(finished);
            }
            continue;
        }

        if let Some(caps) = LINK_RE.captures(line) {
            current.links.push(ManifestLink {
                name: caps[1].trim().to_string(),
                href: caps[2].trim().to_string(),
                notes: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|n| !n.is_empty()),
            });
        } else if let Some(caps) = BARE_URL_RE.captures(line) {
            let href = caps[1].to_string();
            current.links.push(ManifestLink {
                name: href.clone(),
                href,
                notes: None,
            });
        }
        // Anything else is prose.
    }

    if current.title.is_some() || !current.links.is_empty() {
        sections.push(current);
    }

    Ok(ManifestDoc {
        title,
        summary: (!summary.is_empty()).then(|| summary.join(" ")),
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCS_MANIFEST: &str = "\
# Example Docs

> Example documentation for testing
> the manifest parser.

Some introductory prose that is not a link.

## Getting Started

- [Installation](https://docs.example.com/getting-started/installation): How to install
- [Quick Start](/getting-started/quick-start)

## API Reference

- [Client](https://docs.example.com/api/client): The client type
* [Errors](https://docs.example.com/api/errors)
";

    #[test]
    fn parses_sections_and_links() {
        let doc = parse_manifest(DOCS_MANIFEST).unwrap();

        assert_eq!(doc.title, "Example Docs");
        assert_eq!(
            doc.summary.as_deref(),
            Some("Example documentation for testing the manifest parser.")
        );
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].title.as_deref(), Some("Getting Started"));
        assert_eq!(doc.sections[1].links.len(), 2);
        assert_eq!(doc.links().count(), 4);

        let first = &doc.sections[0].links[0];
        assert_eq!(first.name, "Installation");
        assert_eq!(first.href, "https://docs.example.com/getting-started/installation");
        assert_eq!(first.notes.as_deref(), Some("How to install"));
        assert!(doc.sections[0].links[1].notes.is_none());
    }

    #[test]
    fn links_before_any_section_are_kept() {
        let doc = parse_manifest("# Minimal\n- [Home](https://example.com/)\n").unwrap();
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.sections[0].title.is_none());
        assert_eq!(doc.links().count(), 1);
    }

    #[test]
    fn bare_url_lines_become_links() {
        let doc = parse_manifest("# Plain\nhttps://example.com/faq\n/pricing\nnot a link\n").unwrap();
        let hrefs: Vec<&str> = doc.links().map(|l| l.href.as_str()).collect();
        assert_eq!(hrefs, vec!["https://example.com/faq", "/pricing"]);
    }

    #[test]
    fn resolves_relative_links_against_base() {
        let doc = parse_manifest(DOCS_MANIFEST).unwrap();
        let base = Url::parse("https://docs.example.com/llms.txt").unwrap();
        let urls = doc.resolved_urls(&base);
        assert_eq!(urls[1], "https://docs.example.com/getting-started/quick-start");
        assert_eq!(urls.len(), 4);
    }

    #[test]
    fn empty_content_fails() {
        assert!(parse_manifest("").is_err());
        assert!(parse_manifest("   \n\n").is_err());
    }

    #[test]
    fn missing_h1_fails() {
        assert!(parse_manifest("This has no heading\nJust text.").is_err());
        assert!(parse_manifest("## Only a section\n- [A](https://a.com)").is_err());
        assert!(parse_manifest("<!doctype html><html></html>").is_err());
    }
}
