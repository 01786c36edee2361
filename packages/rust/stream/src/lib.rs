//! Answer streaming: fold upstream reasoning events into client records.
//!
//! This crate provides:
//! - [`event`]: the upstream [`StreamEvent`] model and typed tool calls
//! - [`dedup`]: cumulative snapshot → appended suffix
//! - [`registry`]: reasoning-step and source merging
//! - [`aggregator`]: the per-answer state machine
//! - [`session`]: a table of live answers keyed by [`SessionId`](sitescout_shared::SessionId)
//! - [`pump`]: async driver with backpressure and cancellation
//! - [`wire`]: NDJSON and SSE framing

pub mod aggregator;
pub mod dedup;
pub mod event;
pub mod pump;
pub mod registry;
pub mod session;
pub mod wire;

pub use aggregator::{ClientEvent, Phase, StreamAggregator, StreamState};
pub use dedup::delta;
pub use event::{ReasoningStep, StreamEvent, ToolCallRecord, ToolInvocation};
pub use pump::{PumpOutcome, pump};
pub use registry::{MergedSources, SourceRecord, SourceSet, merge_reasoning_steps, merge_sources};
pub use session::SessionTable;
pub use wire::{WireFormat, decode_event_line, encode_line, encode_sse};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A full answer as the reasoning process would report it.
    #[test]
    fn answer_lifecycle() {
        let lines = [
            r#"{"kind":"started","seq":0}"#,
            r#"{"kind":"tool-call","seq":1,"id":"c1","name":"crawl_selected_urls","arguments":{"urls":["https://docs.agno.com/tools","https://docs.agno.com/agents/"]}}"#,
            r#"{"kind":"reasoning-update","seq":2,"steps":[{"title":"Read docs","narrative":"Two pages look relevant","confidence":0.7}]}"#,
            r#"{"kind":"content-delta","seq":3,"content":"Agno tools are"}"#,
            r#"{"kind":"content-delta","seq":4,"content":"Agno tools are functions."}"#,
            r#"{"kind":"tool-call","seq":5,"id":"c1","name":"crawl_selected_urls","arguments":{"urls":["https://docs.agno.com/tools","https://docs.agno.com/agents/"]}}"#,
            r#"{"kind":"completed","seq":6}"#,
        ];

        let mut aggregator = StreamAggregator::new();
        let mut emitted = Vec::new();
        for line in lines {
            let event = decode_event_line(line).unwrap().unwrap();
            emitted.extend(aggregator.apply(event));
        }

        let types: Vec<String> = emitted
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "crawling-progress",
                "reasoning-progress",
                "content-chunk",
                "content-chunk",
                "completion",
            ]
        );

        let completion = serde_json::to_value(emitted.last().unwrap()).unwrap();
        assert_eq!(completion["final_content"], "Agno tools are functions.");
        assert_eq!(
            completion["sources"],
            json!([
                {"url": "https://docs.agno.com/tools", "domain": "docs.agno.com", "title": "tools"},
                {"url": "https://docs.agno.com/agents/", "domain": "docs.agno.com", "title": "agents"},
            ])
        );
        assert_eq!(completion["reasoning_steps"][0]["title"], "Read docs");
    }
}
