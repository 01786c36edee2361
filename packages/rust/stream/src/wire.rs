//! Text encodings for client events, and decoding of upstream event lines.

use serde::Serialize;
use sitescout_shared::{Result, SiteScoutError};

use crate::event::StreamEvent;

/// Framing used on the push channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// One JSON record per line.
    #[default]
    Ndjson,
    /// Server-sent events, `data: <json>` followed by a blank line.
    Sse,
}

impl WireFormat {
    pub fn encode<T: Serialize>(self, record: &T) -> Result<String> {
        match self {
            Self::Ndjson => encode_line(record),
            Self::Sse => encode_sse(record),
        }
    }
}

/// `<json>\n`
pub fn encode_line<T: Serialize>(record: &T) -> Result<String> {
    Ok(format!("{}\n", to_json(record)?))
}

/// `data: <json>\n\n`
pub fn encode_sse<T: Serialize>(record: &T) -> Result<String> {
    Ok(format!("data: {}\n\n", to_json(record)?))
}

fn to_json<T: Serialize>(record: &T) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| SiteScoutError::Stream(format!("failed to serialize event: {e}")))
}

/// Parse one NDJSON line of upstream events. Blank lines yield `None`.
pub fn decode_event_line(line: &str) -> Result<Option<StreamEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| SiteScoutError::parse(format!("invalid stream event: {e}")))
}
