//! `data:` line decoding.

use crate::ai::gemini::StreamChunk;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
pub enum StreamEvent {
    Payload(StreamChunk),
    Done,
}

/// Decode one framed line.
///
/// Lines without the `data:` prefix (blank separators, `event:` fields,
/// comments) yield `None`, as do payloads that fail to parse; the latter are
/// logged and otherwise ignored.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix(DATA_PREFIX)?.trim();

    if data == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }
    if data.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = &chunk.error {
                tracing::warn!(
                    "Stream payload carried an error ({}): {}",
                    error.status.as_deref().unwrap_or("unknown"),
                    error.message.as_deref().unwrap_or("no message")
                );
            }
            Some(StreamEvent::Payload(chunk))
        }
        Err(e) => {
            tracing::warn!(
                "Dropping undecodable stream payload ({} bytes): {}",
                data.len(),
                e
            );
            None
        }
    }
}
