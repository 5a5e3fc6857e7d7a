//! Flattening of a decoded payload into raw parts.

use crate::ai::gemini::StreamChunk;
use crate::ai::mime::is_image_mime;
use crate::models::RawPart;
use base64::Engine as _;
use bytes::Bytes;

/// Parts of the first candidate, in payload order.
///
/// Empty text, non-image inline data, parts of other shapes and images whose
/// base64 does not decode are skipped.
pub fn extract_parts(chunk: &StreamChunk) -> Vec<RawPart> {
    let Some(candidate) = chunk.candidates.first() else {
        return Vec::new();
    };
    if let Some(reason) = candidate
        .finish_reason
        .as_deref()
        .filter(|reason| *reason != "STOP")
    {
        tracing::warn!("Candidate finished early: {}", reason);
    }
    let Some(content) = candidate.content.as_ref() else {
        return Vec::new();
    };

    let mut parts = Vec::with_capacity(content.parts.len());
    for part in &content.parts {
        if let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) {
            parts.push(RawPart::Text(text.to_string()));
        }

        if let Some(inline) = &part.inline_data {
            if !is_image_mime(&inline.mime_type) {
                tracing::debug!("Skipping inline data with mime type {}", inline.mime_type);
                continue;
            }
            match base64::engine::general_purpose::STANDARD.decode(inline.data.trim()) {
                Ok(data) => parts.push(RawPart::InlineBinary {
                    data: Bytes::from(data),
                    mime_type: inline.mime_type.clone(),
                }),
                Err(e) => {
                    tracing::warn!(
                        "Skipping {} part with undecodable base64 ({} chars): {}",
                        inline.mime_type,
                        inline.data.len(),
                        e
                    );
                }
            }
        }
    }

    parts
}
