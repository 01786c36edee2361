//! Reasoning steps and sources collected during one answer.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use url::Url;

use crate::event::{ReasoningStep, ToolCallRecord};

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

/// Replace `existing` with the `incoming` snapshot. Returns whether anything
/// changed.
pub fn merge_reasoning_steps(existing: &mut Vec<ReasoningStep>, incoming: Vec<ReasoningStep>) -> bool {
    let incoming: Vec<ReasoningStep> = incoming.into_iter().map(ReasoningStep::clamped).collect();
    if *existing == incoming {
        return false;
    }
    *existing = incoming;
    true
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A page the answer drew on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SourceRecord {
    /// Build a record for `url`. Without a usable `title` the last non-empty
    /// path segment is used, then the domain. `None` for URLs without a host.
    pub fn from_url(url: &str, title: Option<&str>) -> Option<Self> {
        let parsed = Url::parse(url.trim()).ok()?;
        let domain = parsed.host_str()?.to_string();

        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| domain.clone());

        Some(Self {
            url: url.trim().to_string(),
            domain,
            title: Some(title),
        })
    }
}

/// Sources keyed by URL, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SourceSet {
    records: IndexMap<String, SourceRecord>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless its URL is already present. Returns whether it was added.
    pub fn insert(&mut self, record: SourceRecord) -> bool {
        if self.records.contains_key(&record.url) {
            return false;
        }
        self.records.insert(record.url.clone(), record);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.records.contains_key(url)
    }

    pub fn get(&self, url: &str) -> Option<&SourceRecord> {
        self.records.get(url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRecord> {
        self.records.values()
    }

    pub fn to_vec(&self) -> Vec<SourceRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sources found in a tool call, split by where they came from.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergedSources {
    /// New URLs taken from the `urls` argument.
    pub from_arguments: Vec<String>,
    /// New URLs taken from a search-style result list.
    pub from_result: Vec<String>,
}

impl MergedSources {
    pub fn is_empty(&self) -> bool {
        self.from_arguments.is_empty() && self.from_result.is_empty()
    }
}

/// Union the sources a tool call carries into `existing`.
///
/// URLs come from the `urls` argument and from a result that is an array (or
/// a JSON string holding an array) of `{url, title?}` objects. Re-applying
/// the same call adds nothing.
pub fn merge_sources(existing: &mut SourceSet, call: &ToolCallRecord) -> MergedSources {
    let mut merged = MergedSources::default();

    for url in call.argument_urls() {
        if add_source(existing, &url, None, &call.id) {
            merged.from_arguments.push(url);
        }
    }

    if let Some(result) = &call.result {
        for (url, title) in result_entries(result) {
            if add_source(existing, &url, title.as_deref(), &call.id) {
                merged.from_result.push(url);
            }
        }
    }

    merged
}

fn add_source(existing: &mut SourceSet, url: &str, title: Option<&str>, call_id: &str) -> bool {
    if existing.contains(url.trim()) {
        return false;
    }
    match SourceRecord::from_url(url, title) {
        Some(record) => existing.insert(record),
        None => {
            warn!(url, tool_call = call_id, "skipping source with unparseable url");
            false
        }
    }
}

/// `(url, title)` pairs from a search-style result.
fn result_entries(result: &Value) -> Vec<(String, Option<String>)> {
    let parsed;
    let items = match result {
        Value::Array(items) => items,
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => {
                parsed = items;
                &parsed
            }
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let url = item.get("url")?.as_str()?.to_string();
            let title = item.get("title").and_then(Value::as_str).map(str::to_string);
            Some((url, title))
        })
        .collect()
}
