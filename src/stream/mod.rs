//! Response stream processing
//!
//! Bytes → lines ([`framer`]) → events ([`decoder`]) → raw parts ([`parts`])
//! → content items ([`aggregator`]). [`StreamPipeline`] bundles the state one
//! session needs so nothing is shared between sessions.

pub mod aggregator;
pub mod decoder;
pub mod framer;
pub mod markdown;
pub mod parts;

pub use aggregator::ContentAggregator;
pub use decoder::{decode_line, StreamEvent};
pub use framer::LineFramer;
pub use parts::extract_parts;

use crate::ai::gemini::Part;
use crate::models::ContentItem;

/// Per-session decoding state.
#[derive(Debug)]
pub struct StreamPipeline {
    framer: LineFramer,
    aggregator: ContentAggregator,
    active: bool,
    chunk_count: usize,
    payload_count: usize,
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPipeline {
    pub fn new() -> Self {
        Self {
            framer: LineFramer::new(),
            aggregator: ContentAggregator::new(),
            active: true,
            chunk_count: 0,
            payload_count: 0,
        }
    }

    /// Frame a body chunk into complete lines.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.chunk_count += 1;
        tracing::trace!("Chunk {}: {} bytes", self.chunk_count, chunk.len());
        self.framer.push(chunk)
    }

    /// Residual partial line once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        self.framer.finish()
    }

    /// Decode one line and fold its parts into the aggregate, returning the
    /// items to deliver. After `[DONE]` the pipeline is inactive and further
    /// lines are ignored.
    pub fn handle_line(&mut self, line: &str) -> Vec<ContentItem> {
        if !self.active {
            return Vec::new();
        }

        match decode_line(line) {
            Some(StreamEvent::Done) => {
                tracing::debug!("End-of-stream sentinel received");
                self.active = false;
                Vec::new()
            }
            Some(StreamEvent::Payload(chunk)) => {
                self.payload_count += 1;
                extract_parts(&chunk)
                    .into_iter()
                    .map(|part| self.aggregator.push(part))
                    .collect()
            }
            None => Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn aggregator(&self) -> &ContentAggregator {
        &self.aggregator
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    /// Parts for the model turn, empty when nothing was produced.
    pub fn model_parts(&self) -> Vec<Part> {
        self.aggregator.to_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;

    fn run(chunks: &[&str]) -> (StreamPipeline, Vec<ContentItem>) {
        let mut pipeline = StreamPipeline::new();
        let mut items = Vec::new();
        for chunk in chunks {
            for line in pipeline.push_chunk(chunk.as_bytes()) {
                items.extend(pipeline.handle_line(&line));
            }
        }
        if let Some(line) = pipeline.finish() {
            items.extend(pipeline.handle_line(&line));
        }
        (pipeline, items)
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let (pipeline, items) = run(&[
            "data: {\"candidates\":[{\"content\":{\"par",
            "ts\":[{\"text\":\"Hi\"}]}}]}\n\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" there\"}]}}]}\n",
            "data: [DONE]\n",
        ]);

        assert_eq!(items.len(), 2);
        assert!(!items[0].is_incremental);
        assert!(items[1].is_incremental);
        assert!(!pipeline.is_active());
        assert_eq!(pipeline.payload_count(), 2);
        assert_eq!(pipeline.chunk_count(), 3);
        assert_eq!(pipeline.model_parts(), vec![Part::text("Hi there")]);
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let (pipeline, items) = run(&[
            ": ping\n",
            "data: {broken\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n",
        ]);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind(), ContentKind::PlainText);
        assert!(pipeline.is_active());
    }

    #[test]
    fn test_lines_after_done_are_ignored() {
        let (_, items) = run(&[
            "data: [DONE]\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"late\"}]}}]}\n",
        ]);
        assert!(items.is_empty());
    }

    #[test]
    fn test_unterminated_final_line_is_processed() {
        let (_, items) = run(&["data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"tail\"}]}}]}"]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text(), Some("tail"));
    }
}
