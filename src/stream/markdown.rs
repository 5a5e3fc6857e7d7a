//! Cheap markdown detection for streamed text fragments.
//!
//! The check is intentionally loose: a lone `*` or `#` is enough to mark a
//! fragment as structured, so arithmetic or hashtags in prose also match.

use regex::Regex;
use std::sync::LazyLock;

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // heading
        r"(?m)^\s{0,3}#{1,6}\s",
        // fenced code block
        r"(?m)^\s{0,3}(```|~~~)",
        // inline code
        r"`[^`\n]+`",
        // bold
        r"\*\*[^*\n]+\*\*|__[^_\n]+__",
        // italic
        r"\*[^*\s][^*\n]*\*|\b_[^_\n]+_\b",
        // block quote
        r"(?m)^\s{0,3}>\s?",
        // unordered list
        r"(?m)^\s*[-*+]\s+\S",
        // ordered list
        r"(?m)^\s*\d+[.)]\s+\S",
        // link
        r"\[[^\]\n]+\]\([^)\s]+\)",
        // image
        r"!\[[^\]\n]*\]\([^)\s]+\)",
        // table row
        r"(?m)^\s*\|.*\|\s*$",
        // horizontal rule
        r"(?m)^\s{0,3}([-*_])(\s*[-*_]){2,}\s*$",
    ]
    .iter()
    .filter_map(|pattern| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!("Invalid markdown pattern {:?}: {}", pattern, e);
            None
        }
    })
    .collect()
});

const MARKERS: &[&str] = &["**", "*", "#", "```", "•", "◦", "▪"];

/// True when `text` looks like markdown.
pub fn is_structured(text: &str) -> bool {
    PATTERNS.iter().any(|pattern| pattern.is_match(text))
        || MARKERS.iter().any(|marker| text.contains(marker))
}

/// Characters of the previous text joined with a new fragment; markers split
/// across fragments are only a few characters long.
const BOUNDARY_WINDOW: usize = 16;

/// True when appending `fragment` to `previous` forms markdown that neither
/// side shows on its own, e.g. a list marker whose line started in the
/// previous fragment.
///
/// Only the last `BOUNDARY_WINDOW` characters of `previous`, cut at the last
/// newline, are examined, so the cost depends on the fragment alone.
pub fn forms_structure(previous: &str, fragment: &str) -> bool {
    let start = previous
        .char_indices()
        .rev()
        .take(BOUNDARY_WINDOW)
        .last()
        .map_or(previous.len(), |(index, _)| index);
    let suffix = &previous[start..];

    let (tail, at_line_start) = match suffix.rfind('\n') {
        Some(pos) => (&suffix[pos + 1..], true),
        None => (suffix, start == 0),
    };
    if tail.is_empty() {
        return false;
    }

    let mut window = String::with_capacity(tail.len() + fragment.len() + 1);
    // A cut line must not look like it starts a block.
    if !at_line_start {
        window.push('x');
    }
    window.push_str(tail);
    window.push_str(fragment);
    is_structured(&window)
}
