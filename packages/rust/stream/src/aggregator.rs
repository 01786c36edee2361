//! Per-answer state machine.
//!
//! A [`StreamAggregator`] folds the upstream [`StreamEvent`] sequence of one
//! answer into a [`StreamState`] and says what the client should be told
//! about each event. Phases run `idle → streaming → completed | errored`;
//! nothing leaves a terminal phase.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup::{delta, is_extension};
use crate::event::{ReasoningStep, StreamEvent, ToolCallRecord};
use crate::registry::{SourceRecord, SourceSet, merge_reasoning_steps, merge_sources};

/// Lifecycle of one answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// Client-facing record, tagged on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    ReasoningProgress {
        steps: Vec<ReasoningStep>,
    },
    CrawlingProgress {
        urls: Vec<String>,
        message: String,
    },
    ContentChunk {
        text: String,
        full_content: String,
    },
    Completion {
        final_content: String,
        sources: Vec<SourceRecord>,
        reasoning_steps: Vec<ReasoningStep>,
    },
    Error {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Running view of one answer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamState {
    content: String,
    /// Last cumulative snapshot seen; deltas are taken against it.
    #[serde(skip)]
    baseline: String,
    reasoning_steps: Vec<ReasoningStep>,
    sources: SourceSet,
    tool_calls: IndexMap<String, ToolCallRecord>,
    streaming: bool,
    phase: Phase,
    /// Tool-call id → index of the reasoning step it produced.
    #[serde(skip)]
    step_slots: HashMap<String, usize>,
}

impl StreamState {
    /// Cumulative content. Only grows, except for the final snapshot.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning_steps(&self) -> &[ReasoningStep] {
        &self.reasoning_steps
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallRecord> {
        self.tool_calls.get(id)
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRecord> {
        self.tool_calls.values()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Insert or replace the step owned by `call_id`.
    fn upsert_step(&mut self, call_id: &str, step: ReasoningStep) -> bool {
        match self.step_slots.get(call_id) {
            Some(&index) if index < self.reasoning_steps.len() => {
                if self.reasoning_steps[index] == step {
                    return false;
                }
                self.reasoning_steps[index] = step;
            }
            _ => {
                self.step_slots
                    .insert(call_id.to_string(), self.reasoning_steps.len());
                self.reasoning_steps.push(step);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StreamAggregator {
    state: StreamState,
    last_seq: Option<u64>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase.is_terminal()
    }

    /// Apply one event and return the client events it produces.
    pub fn apply(&mut self, event: StreamEvent) -> Vec<ClientEvent> {
        if self.state.phase.is_terminal() {
            debug!(kind = event.kind(), seq = event.seq(), phase = ?self.state.phase, "event after end of answer discarded");
            return Vec::new();
        }

        let seq = event.seq();
        match self.last_seq {
            Some(last) if seq < last => {
                warn!(kind = event.kind(), seq, last_seq = last, "stale event discarded");
                return Vec::new();
            }
            _ => self.last_seq = Some(seq),
        }

        if self.state.phase == Phase::Idle {
            self.state.phase = Phase::Streaming;
            self.state.streaming = true;
        }

        match event {
            StreamEvent::Started { .. } => Vec::new(),
            StreamEvent::ContentDelta { content, .. } => self.on_content(content),
            StreamEvent::ToolCall {
                id,
                name,
                arguments,
                result,
                ..
            } => self.on_tool_call(ToolCallRecord {
                id,
                name,
                arguments,
                result,
            }),
            StreamEvent::ReasoningUpdate { steps, .. } => {
                if merge_reasoning_steps(&mut self.state.reasoning_steps, steps) {
                    self.state.step_slots.clear();
                    vec![self.reasoning_progress()]
                } else {
                    Vec::new()
                }
            }
            StreamEvent::Completed {
                content,
                reasoning_steps,
                ..
            } => self.on_completed(content, reasoning_steps),
            StreamEvent::Error { message, .. } => {
                self.state.phase = Phase::Errored;
                self.state.streaming = false;
                vec![ClientEvent::Error { message }]
            }
        }
    }

    fn on_content(&mut self, snapshot: String) -> Vec<ClientEvent> {
        if !is_extension(&self.state.baseline, &snapshot) {
            debug!(
                baseline_len = self.state.baseline.len(),
                snapshot_len = snapshot.len(),
                "divergent content snapshot, resetting baseline"
            );
        }
        let appended = delta(&self.state.baseline, &snapshot).to_string();
        self.state.baseline = snapshot;

        if appended.is_empty() {
            return Vec::new();
        }
        self.state.content.push_str(&appended);
        vec![ClientEvent::ContentChunk {
            text: appended,
            full_content: self.state.content.clone(),
        }]
    }

    fn on_tool_call(&mut self, record: ToolCallRecord) -> Vec<ClientEvent> {
        let previous = self.state.tool_calls.get(&record.id);
        if previous == Some(&record) {
            return Vec::new();
        }
        let is_new_call = previous.is_none();
        let previous_urls = previous.map(ToolCallRecord::argument_urls).unwrap_or_default();

        let invocation = record.invocation();
        let merged = merge_sources(&mut self.state.sources, &record);
        let mut out = Vec::new();

        let urls = record.argument_urls();
        if !urls.is_empty() && urls != previous_urls {
            out.push(ClientEvent::CrawlingProgress {
                message: format!("Analyzing {} pages...", urls.len()),
                urls,
            });
        } else if invocation.is_search() && is_new_call {
            out.push(ClientEvent::CrawlingProgress {
                urls: Vec::new(),
                message: "Searching the web...".into(),
            });
        }

        if !merged.from_result.is_empty() {
            out.push(ClientEvent::CrawlingProgress {
                message: format!("Found {} relevant sources...", merged.from_result.len()),
                urls: merged.from_result,
            });
        }

        if let Some(step) = invocation.reasoning_step() {
            if self.state.upsert_step(&record.id, step) {
                out.push(self.reasoning_progress());
            }
        }

        debug!(id = %record.id, name = %record.name, new_sources = self.state.sources.len(), "tool call recorded");
        self.state.tool_calls.insert(record.id.clone(), record);
        out
    }

    fn on_completed(
        &mut self,
        content: Option<String>,
        reasoning_steps: Option<Vec<ReasoningStep>>,
    ) -> Vec<ClientEvent> {
        if let Some(content) = content {
            self.state.baseline = content.clone();
            self.state.content = content;
        }
        if let Some(steps) = reasoning_steps {
            merge_reasoning_steps(&mut self.state.reasoning_steps, steps);
            self.state.step_slots.clear();
        }
        self.state.phase = Phase::Completed;
        self.state.streaming = false;

        vec![ClientEvent::Completion {
            final_content: self.state.content.clone(),
            sources: self.state.sources.to_vec(),
            reasoning_steps: self.state.reasoning_steps.clone(),
        }]
    }

    fn reasoning_progress(&self) -> ClientEvent {
        ClientEvent::ReasoningProgress {
            steps: self.state.reasoning_steps.clone(),
        }
    }
}
