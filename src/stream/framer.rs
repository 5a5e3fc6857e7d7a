//! Newline framing for a chunked response body.

/// Splits an unbounded byte stream into `\n`-terminated lines.
///
/// Bytes are buffered until a terminator arrives, so chunk boundaries (even
/// ones falling inside a multi-byte character) never change the output.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.buffer.extend_from_slice(&rest[..pos]);
            lines.push(take_line(&mut self.buffer));
            rest = &rest[pos + 1..];
        }
        self.buffer.extend_from_slice(rest);

        lines
    }

    /// Flush whatever is left once the source has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(take_line(&mut self.buffer))
        }
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn take_line(buffer: &mut Vec<u8>) -> String {
    if buffer.last() == Some(&b'\r') {
        buffer.pop();
    }
    let line = String::from_utf8_lossy(buffer).into_owned();
    buffer.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STREAM: &[u8] = "data: {\"text\":\"héllo\"}\r\n\ndata: [DONE]\npartial".as_bytes();

    fn frame_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = LineFramer::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(framer.push(chunk));
        }
        lines.extend(framer.finish());
        lines
    }

    #[test]
    fn test_whole_stream_yields_lines_and_residual() {
        assert_eq!(
            frame_all(&[STREAM]),
            vec![
                "data: {\"text\":\"héllo\"}".to_string(),
                String::new(),
                "data: [DONE]".to_string(),
                "partial".to_string(),
            ]
        );
    }

    #[test]
    fn test_any_split_point_yields_identical_lines() {
        let expected = frame_all(&[STREAM]);
        for split in 0..=STREAM.len() {
            let (head, tail) = STREAM.split_at(split);
            assert_eq!(frame_all(&[head, tail]), expected, "split at {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_whole() {
        let chunks: Vec<&[u8]> = STREAM.chunks(1).collect();
        assert_eq!(frame_all(&chunks), frame_all(&[STREAM]));
    }

    #[test]
    fn test_long_line_is_not_truncated() {
        let payload = "A".repeat(3 * 1024 * 1024);
        let mut framer = LineFramer::new();
        for chunk in payload.as_bytes().chunks(8192) {
            assert!(framer.push(chunk).is_empty());
        }
        assert_eq!(framer.pending_len(), payload.len());
        assert_eq!(framer.push(b"\n"), vec![payload]);
        assert_eq!(framer.finish(), None);
    }
}
