//! Consumer-side view of a session's output.
//!
//! Items arrive as deltas. A [`Transcript`] folds them back into display
//! runs: an incremental delta joins the previous run when the kinds match and
//! the delta does not open with a newline. Anything else starts a new run, so
//! paragraph breaks are preserved rather than silently merged.

use crate::models::{ContentBody, ContentItem, ContentKind};
use crate::session::ContentSink;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Run {
    Text { kind: ContentKind, text: String },
    Image { data: Bytes, mime_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

#[derive(Debug, Default)]
pub struct Transcript {
    items: Vec<ContentItem>,
    runs: Vec<Run>,
    outcome: Option<Outcome>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an item into the runs. Returns `true` when it extended the last
    /// run and `false` when it started a new one.
    pub fn apply(&mut self, item: &ContentItem) -> bool {
        let merged = match (&item.body, self.runs.last_mut()) {
            (
                ContentBody::PlainText(delta) | ContentBody::StructuredText(delta),
                Some(Run::Text { kind, text }),
            ) if item.is_incremental
                && *kind == item.kind()
                && !delta.starts_with('\n')
                && !delta.starts_with("\r\n") =>
            {
                text.push_str(delta);
                true
            }
            _ => false,
        };

        if !merged {
            self.runs.push(match &item.body {
                ContentBody::PlainText(text) | ContentBody::StructuredText(text) => Run::Text {
                    kind: item.kind(),
                    text: text.clone(),
                },
                ContentBody::Image { data, mime_type } => Run::Image {
                    data: data.clone(),
                    mime_type: mime_type.clone(),
                },
            });
        }
        merged
    }

    /// Items in the order they were received.
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    /// All text received, in order, with runs concatenated.
    pub fn text(&self) -> String {
        self.runs
            .iter()
            .filter_map(|run| match run {
                Run::Text { text, .. } => Some(text.as_str()),
                Run::Image { .. } => None,
            })
            .collect()
    }

    pub fn images(&self) -> Vec<&Bytes> {
        self.runs
            .iter()
            .filter_map(|run| match run {
                Run::Image { data, .. } => Some(data),
                Run::Text { .. } => None,
            })
            .collect()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

impl ContentSink for Transcript {
    fn on_content_item(&mut self, item: ContentItem) {
        self.apply(&item);
        self.items.push(item);
    }

    fn on_error(&mut self, message: &str) {
        self.outcome = Some(Outcome::Failed(message.to_string()));
    }

    fn on_complete(&mut self) {
        self.outcome = Some(Outcome::Completed);
    }
}
