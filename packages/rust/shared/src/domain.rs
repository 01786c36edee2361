//! Domain allow-list checks.
//!
//! [`AllowList`] is the only place that decides whether a URL may be crawled.
//! Everything that admits URLs (requested pages, discovered links, manifest
//! entries) goes through it.
//!
//! Matching rules:
//! - hostnames compare case-insensitively, ignoring a trailing dot;
//! - a plain entry (`example.com`) admits that host, with or without a
//!   leading `www.`, and nothing else;
//! - a wildcard entry (`*.example.com`) admits `example.com` and any of its
//!   subdomains;
//! - malformed URLs, URLs without a host, and non-http(s) schemes are rejected;
//! - an empty allow-list admits nothing.

use std::fmt;

use url::Url;

/// A single normalized allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DomainRule {
    /// Exact host, stored without a `www.` prefix.
    Exact(String),
    /// `*.base`: the base domain and every subdomain of it.
    Subdomains(String),
}

impl DomainRule {
    fn parse(entry: &str) -> Option<Self> {
        let host = entry_host(entry)?;

        if let Some(base) = host.strip_prefix("*.") {
            if base.is_empty() {
                return None;
            }
            return Some(Self::Subdomains(base.to_string()));
        }

        let host = strip_www(&host);
        if host.is_empty() || host.contains('*') {
            return None;
        }
        Some(Self::Exact(host.to_string()))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(expected) => strip_www(host) == expected,
            Self::Subdomains(base) => {
                host == base
                    || host
                        .strip_suffix(base.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        }
    }
}

impl fmt::Display for DomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(host) => f.write_str(host),
            Self::Subdomains(base) => write!(f, "*.{base}"),
        }
    }
}

/// Pre-normalized set of admissible domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    rules: Vec<DomainRule>,
}

impl AllowList {
    /// Build an allow-list from hostnames, wildcard entries, or absolute URLs.
    ///
    /// Entries that cannot be normalized are dropped (and logged at `debug`).
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules: Vec<DomainRule> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            match DomainRule::parse(entry) {
                Some(rule) if !rules.contains(&rule) => rules.push(rule),
                Some(_) => {}
                None => tracing::debug!(entry, "ignoring unusable allow-list entry"),
            }
        }
        Self { rules }
    }

    /// Derive an allow-list from the hosts of a set of starting URLs.
    pub fn from_start_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            urls.into_iter()
                .filter_map(|u| admissible_host(u.as_ref()).map(str::to_string)),
        )
    }

    /// Whether no entries survived normalization.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Normalized entries, for display and logging.
    pub fn entries(&self) -> Vec<String> {
        self.rules.iter().map(ToString::to_string).collect()
    }

    /// Check a URL string. Malformed URLs are rejected.
    pub fn admits(&self, url: &str) -> bool {
        match Url::parse(url.trim()) {
            Ok(parsed) => self.admits_url(&parsed),
            Err(_) => false,
        }
    }

    /// Check an already-parsed URL.
    pub fn admits_url(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = normalize_host(host);
        if host.is_empty() {
            return false;
        }
        self.rules.iter().any(|rule| rule.matches(&host))
    }
}

/// Decide whether `url` belongs to `allowed_domains`.
///
/// Convenience form of [`AllowList::admits`] for one-off checks; callers that
/// check many URLs should build an [`AllowList`] once.
pub fn is_allowed<S: AsRef<str>>(url: &str, allowed_domains: &[S]) -> bool {
    AllowList::new(allowed_domains).admits(url)
}

/// `scheme://host[:port]` of an absolute http(s) URL.
pub fn site_root(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn admissible_host(url: &str) -> Option<&str> {
    let trimmed = url.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = authority.rsplit('@').next().unwrap_or(authority);
    (!host.is_empty()).then_some(host)
}

/// Reduce an allow-list entry to a lowercased host (keeping any `*.` prefix).
fn entry_host(entry: &str) -> Option<String> {
    let entry = entry.trim().to_ascii_lowercase();
    if entry.is_empty() {
        return None;
    }

    let host = if entry.contains("://") {
        Url::parse(&entry).ok()?.host_str()?.to_string()
    } else if let Some(v6_end) = entry.strip_prefix('[').and_then(|s| s.find(']')) {
        entry[..v6_end + 2].to_string()
    } else {
        let without_path = entry.split(['/', '?', '#']).next().unwrap_or_default();
        without_path
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string()
    };

    let host = normalize_host(&host);
    (!host.is_empty()).then_some(host)
}

fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
