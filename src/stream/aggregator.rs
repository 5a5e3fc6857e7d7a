//! Ordered aggregation of raw parts into content items.

use super::markdown;
use crate::ai::gemini::Part;
use crate::models::{ContentBody, ContentItem, RawPart};

/// Aggregate state of one streaming session.
///
/// Retained items always hold the full running text of each run, while the
/// items returned from [`ContentAggregator::push`] carry only what changed.
/// Only the last item can be an open text run; images close it.
#[derive(Debug, Default)]
pub struct ContentAggregator {
    items: Vec<ContentItem>,
}

impl ContentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one part into the aggregate and return the event to deliver.
    pub fn push(&mut self, part: RawPart) -> ContentItem {
        match part {
            RawPart::InlineBinary { data, mime_type } => {
                let item = ContentItem::new(ContentBody::Image { data, mime_type }, false);
                self.items.push(item.clone());
                item
            }
            RawPart::Text(fragment) => self.push_text(fragment),
        }
    }

    fn push_text(&mut self, fragment: String) -> ContentItem {
        match self.items.last_mut() {
            Some(open) if open.is_text() => extend_run(open, fragment),
            _ => {
                let body = if markdown::is_structured(&fragment) {
                    ContentBody::StructuredText(fragment)
                } else {
                    ContentBody::PlainText(fragment)
                };
                let item = ContentItem::new(body, false);
                self.items.push(item.clone());
                item
            }
        }
    }

    /// Retained items, each holding its full content.
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Wire parts for the model turn: one text part per run and one inline
    /// part per image.
    pub fn to_parts(&self) -> Vec<Part> {
        self.items
            .iter()
            .map(|item| match &item.body {
                ContentBody::PlainText(text) | ContentBody::StructuredText(text) => {
                    Part::text(text.clone())
                }
                ContentBody::Image { data, mime_type } => Part::inline(mime_type.clone(), data),
            })
            .collect()
    }
}

/// Append `fragment` to the open run, promoting it first when the fragment
/// introduces markdown.
fn extend_run(open: &mut ContentItem, fragment: String) -> ContentItem {
    let promote = match &open.body {
        ContentBody::PlainText(previous) => {
            markdown::is_structured(&fragment) || markdown::forms_structure(previous, &fragment)
        }
        _ => false,
    };
    if promote {
        if let ContentBody::PlainText(previous) = &mut open.body {
            let text = std::mem::take(previous);
            tracing::debug!("Promoting {} byte text run to structured text", text.len());
            open.body = ContentBody::StructuredText(text);
        }
    }

    match &mut open.body {
        ContentBody::StructuredText(text) => {
            text.push_str(&fragment);
            ContentItem::new(ContentBody::StructuredText(fragment), true)
        }
        ContentBody::PlainText(text) => {
            text.push_str(&fragment);
            ContentItem::new(ContentBody::PlainText(fragment), true)
        }
        ContentBody::Image { .. } => ContentItem::new(ContentBody::PlainText(fragment), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn text(t: &str) -> RawPart {
        RawPart::Text(t.to_string())
    }

    fn image(bytes: &'static [u8]) -> RawPart {
        RawPart::InlineBinary {
            data: Bytes::from_static(bytes),
            mime_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_text_fragments_accumulate() {
        let mut aggregator = ContentAggregator::new();
        let fragments = ["The ", "quick ", "brown ", "fox"];
        let events: Vec<ContentItem> = fragments.iter().map(|f| aggregator.push(text(f))).collect();

        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.items()[0].text(), Some("The quick brown fox"));
        assert!(!events[0].is_incremental);
        assert!(events[1..].iter().all(|e| e.is_incremental));
        let deltas: Vec<&str> = events.iter().filter_map(|e| e.text()).collect();
        assert_eq!(deltas, fragments.to_vec());
    }

    #[test]
    fn test_promotion_is_monotonic() {
        let mut aggregator = ContentAggregator::new();
        let kinds: Vec<ContentKind> = ["Hello ", "**world**", " again"]
            .iter()
            .map(|f| aggregator.push(text(f)).kind())
            .collect();

        assert_eq!(
            kinds,
            vec![
                ContentKind::PlainText,
                ContentKind::StructuredText,
                ContentKind::StructuredText
            ]
        );
        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.items()[0].kind(), ContentKind::StructuredText);
        assert_eq!(aggregator.items()[0].text(), Some("Hello **world** again"));
    }

    #[test]
    fn test_first_fragment_can_be_structured() {
        let mut aggregator = ContentAggregator::new();
        let event = aggregator.push(text("# Title\n"));
        assert_eq!(event.kind(), ContentKind::StructuredText);
        assert!(!event.is_incremental);
    }

    #[test]
    fn test_structure_split_across_fragments_promotes() {
        let mut aggregator = ContentAggregator::new();
        aggregator.push(text("Steps:\n1"));
        let event = aggregator.push(text(". open the box"));
        assert_eq!(event.kind(), ContentKind::StructuredText);
        assert_eq!(event.text(), Some(". open the box"));
    }

    #[test]
    fn test_long_single_line_run_stays_plain() {
        let mut aggregator = ContentAggregator::new();
        let fragment = "abcdefghijklmno ";
        let fragments = 12_800;
        for _ in 0..fragments {
            let event = aggregator.push(text(fragment));
            assert_eq!(event.text(), Some(fragment));
        }

        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.items()[0].kind(), ContentKind::PlainText);
        assert_eq!(
            aggregator.items()[0].text().map(str::len),
            Some(fragment.len() * fragments)
        );
    }

    #[test]
    fn test_image_never_merges() {
        let mut aggregator = ContentAggregator::new();
        aggregator.push(text("Here you go: "));
        let event = aggregator.push(image(&[1, 2, 3]));
        let after = aggregator.push(text("Enjoy"));

        assert_eq!(event.kind(), ContentKind::Image);
        assert!(!event.is_incremental);
        assert!(!after.is_incremental);
        assert_eq!(aggregator.len(), 3);
        assert_eq!(aggregator.items()[0].text(), Some("Here you go: "));
        assert_eq!(aggregator.items()[2].text(), Some("Enjoy"));
    }

    #[test]
    fn test_consecutive_images_are_separate_items() {
        let mut aggregator = ContentAggregator::new();
        aggregator.push(image(&[1]));
        aggregator.push(image(&[2]));
        assert_eq!(aggregator.len(), 2);
        assert!(aggregator.items().iter().all(|i| i.kind() == ContentKind::Image));
    }

    #[test]
    fn test_to_parts_folds_runs_and_images() {
        let mut aggregator = ContentAggregator::new();
        aggregator.push(text("Hi"));
        aggregator.push(text(" there"));
        aggregator.push(image(&[0x89, 0x50]));

        assert_eq!(
            aggregator.to_parts(),
            vec![Part::text("Hi there"), Part::inline("image/png", &[0x89, 0x50])]
        );
    }
}
