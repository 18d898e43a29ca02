use bytes::BytesMut;

/// A complete line exceeded the caller's limit and was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTooLong;

/// Reassembles protocol lines from arbitrarily chunked socket reads.
///
/// Bytes are buffered until a line terminator arrives; a trailing partial
/// line stays in the buffer for the next read. Lines end in CRLF; a bare LF
/// is accepted too. Returned lines carry no terminator.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    /// Set while skipping the remainder of an overlong line
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes of the pending partial line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete line, if one is buffered.
    ///
    /// Lines longer than `limit` bytes (terminator excluded) yield
    /// `Err(LineTooLong)` once, after their terminator has been seen.
    pub fn next_line(&mut self, limit: usize) -> Option<Result<String, LineTooLong>> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > limit {
                self.discarding = true;
                self.buf.clear();
            }
            return None;
        };

        let raw = self.buf.split_to(pos + 1);
        if std::mem::take(&mut self.discarding) {
            return Some(Err(LineTooLong));
        }

        let mut line = &raw[..pos];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.len() > limit {
            return Some(Err(LineTooLong));
        }

        Some(Ok(String::from_utf8_lossy(line).into_owned()))
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(Ok(line)) = buffer.next_line(1000) {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"HELO a\r\nMAIL FROM:<x@y.z>\r\n");
        assert_eq!(drain(&mut buffer), vec!["HELO a", "MAIL FROM:<x@y.z>"]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_partial_line_carried_over() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"HE");
        assert!(buffer.next_line(1000).is_none());
        buffer.extend(b"LO a\r");
        assert!(buffer.next_line(1000).is_none());
        buffer.extend(b"\nQU");
        assert_eq!(drain(&mut buffer), vec!["HELO a"]);
        assert_eq!(buffer.pending(), 2);
    }

    #[test]
    fn test_bare_lf_and_empty_lines() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"one\n\r\ntwo\r\n");
        assert_eq!(drain(&mut buffer), vec!["one", "", "two"]);
    }

    #[test]
    fn test_overlong_complete_line() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"abcdef\r\nok\r\n");
        assert_eq!(buffer.next_line(3), Some(Err(LineTooLong)));
        assert_eq!(buffer.next_line(3), Some(Ok("ok".to_string())));
    }

    #[test]
    fn test_overlong_partial_line_is_discarded() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"abcdef");
        assert!(buffer.next_line(3).is_none());
        assert_eq!(buffer.pending(), 0);

        buffer.extend(b"gh\r\nnext\r\n");
        assert_eq!(buffer.next_line(3), Some(Err(LineTooLong)));
        assert_eq!(buffer.next_line(10), Some(Ok("next".to_string())));
    }
}
