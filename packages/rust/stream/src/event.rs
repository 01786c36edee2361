//! Upstream event model.
//!
//! The reasoning process reports cumulative snapshots: every `content-delta`
//! carries the whole answer so far, and every `reasoning-update` the whole
//! list of steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool names that run a web search rather than crawl known URLs.
const SEARCH_TOOLS: &[&str] = &["search", "exa_search", "search_exa", "get_contents"];

/// One event from the reasoning process. `seq` never decreases within an
/// answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamEvent {
    Started {
        seq: u64,
    },
    ContentDelta {
        seq: u64,
        /// Full content so far.
        content: String,
    },
    ToolCall {
        seq: u64,
        id: String,
        name: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    ReasoningUpdate {
        seq: u64,
        steps: Vec<ReasoningStep>,
    },
    Completed {
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning_steps: Option<Vec<ReasoningStep>>,
    },
    Error {
        seq: u64,
        message: String,
    },
}

impl StreamEvent {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Started { seq }
            | Self::ContentDelta { seq, .. }
            | Self::ToolCall { seq, .. }
            | Self::ReasoningUpdate { seq, .. }
            | Self::Completed { seq, .. }
            | Self::Error { seq, .. } => *seq,
        }
    }

    /// Kind tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::ContentDelta { .. } => "content-delta",
            Self::ToolCall { .. } => "tool-call",
            Self::ReasoningUpdate { .. } => "reasoning-update",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

/// One reasoning step as shown to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub title: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// In `[0, 1]` once ingested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ReasoningStep {
    /// Clamp `confidence` into `[0, 1]`; NaN is dropped.
    pub fn clamped(mut self) -> Self {
        self.confidence = self
            .confidence
            .filter(|c| !c.is_nan())
            .map(|c| c.clamp(0.0, 1.0));
        self
    }
}

/// Latest known state of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolCallRecord {
    pub fn invocation(&self) -> ToolInvocation {
        ToolInvocation::parse(&self.name, &self.arguments)
    }

    /// URLs listed under the `urls` argument, whatever the tool.
    pub fn argument_urls(&self) -> Vec<String> {
        string_list(self.arguments.get("urls"))
    }
}

/// A tool call interpreted by name. Unknown tools keep their raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    CrawlUrls {
        urls: Vec<String>,
    },
    Think {
        title: String,
        thought: String,
        confidence: Option<f64>,
    },
    Analyze {
        title: String,
        result: String,
        confidence: Option<f64>,
    },
    Search {
        tool: String,
        query: Option<String>,
    },
    Unrecognized {
        name: String,
        arguments: Value,
    },
}

impl ToolInvocation {
    pub fn parse(name: &str, arguments: &Value) -> Self {
        let text = |key: &str| arguments.get(key).and_then(Value::as_str).map(str::to_string);
        let confidence = arguments.get("confidence").and_then(Value::as_f64);

        match name {
            "crawl_selected_urls" => Self::CrawlUrls {
                urls: string_list(arguments.get("urls")),
            },
            "think" => Self::Think {
                title: text("title").unwrap_or_else(|| "Thinking...".into()),
                thought: text("thought").unwrap_or_default(),
                confidence,
            },
            "analyze" => Self::Analyze {
                title: text("title").unwrap_or_else(|| "Analyzing...".into()),
                result: text("result").unwrap_or_default(),
                confidence,
            },
            tool if SEARCH_TOOLS.contains(&tool) => Self::Search {
                tool: tool.to_string(),
                query: text("query"),
            },
            other => Self::Unrecognized {
                name: other.to_string(),
                arguments: arguments.clone(),
            },
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search { .. })
    }

    /// The reasoning step a `think` or `analyze` call stands for.
    pub fn reasoning_step(&self) -> Option<ReasoningStep> {
        let step = match self {
            Self::Think {
                title,
                thought,
                confidence,
            } => ReasoningStep {
                title: title.clone(),
                narrative: thought.clone(),
                result: None,
                confidence: *confidence,
            },
            Self::Analyze {
                title,
                result,
                confidence,
            } => ReasoningStep {
                title: title.clone(),
                narrative: String::new(),
                result: Some(result.clone()),
                confidence: *confidence,
            },
            _ => return None,
        };
        Some(step.clamped())
    }
}

/// A JSON array of strings, or a single string, as a list. Other values are
/// ignored.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(single)) if !single.is_empty() => vec![single.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_deserialize_from_kind_tag() {
        let event: StreamEvent = serde_json::from_str(
            r#"{"kind":"tool-call","seq":3,"id":"t1","name":"crawl_selected_urls","arguments":{"urls":["https://x.com/a"]}}"#,
        )
        .unwrap();
        assert_eq!(event.seq(), 3);
        assert_eq!(event.kind(), "tool-call");

        let event: StreamEvent = serde_json::from_str(r#"{"kind":"completed","seq":9}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Completed {
                seq: 9,
                content: None,
                reasoning_steps: None
            }
        );
    }

    #[test]
    fn known_tools_are_typed() {
        let crawl = ToolInvocation::parse("crawl_selected_urls", &json!({"urls": ["https://a.com/1", 7]}));
        assert_eq!(
            crawl,
            ToolInvocation::CrawlUrls {
                urls: vec!["https://a.com/1".into()]
            }
        );

        let search = ToolInvocation::parse("exa_search", &json!({"query": "rust async"}));
        assert!(search.is_search());

        let think = ToolInvocation::parse("think", &json!({"thought": "hmm", "confidence": 1.7}));
        let step = think.reasoning_step().unwrap();
        assert_eq!(step.title, "Thinking...");
        assert_eq!(step.narrative, "hmm");
        assert_eq!(step.confidence, Some(1.0));

        let analyze = ToolInvocation::parse("analyze", &json!({"title": "Check", "result": "fine"}));
        assert_eq!(analyze.reasoning_step().unwrap().result.as_deref(), Some("fine"));
    }

    #[test]
    fn unknown_tools_keep_arguments() {
        let args = json!({"anything": [1, 2, 3]});
        let parsed = ToolInvocation::parse("translate", &args);
        assert_eq!(
            parsed,
            ToolInvocation::Unrecognized {
                name: "translate".into(),
                arguments: args
            }
        );
        assert!(parsed.reasoning_step().is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        let step = ReasoningStep {
            title: "t".into(),
            narrative: String::new(),
            result: None,
            confidence: Some(-0.5),
        };
        assert_eq!(step.clone().clamped().confidence, Some(0.0));

        let nan = ReasoningStep {
            confidence: Some(f64::NAN),
            ..step
        };
        assert_eq!(nan.clamped().confidence, None);
    }
}
