/// Splits a chunked HTTP body into newline-terminated frames.
///
/// Works on bytes so a multi-byte character split across two chunks is
/// only decoded once both halves have arrived. Carriage returns are
/// dropped on the way in, so `\r\n` bodies split the same way.
#[derive(Debug)]
pub(crate) struct FrameBuffer {
    delimiter: &'static [u8],
    buf: Vec<u8>,
}

impl FrameBuffer {
    /// Newline-delimited JSON
    pub fn ndjson() -> Self {
        Self {
            delimiter: b"\n",
            buf: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
    }

    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let pos = self
                .buf
                .windows(self.delimiter.len())
                .position(|w| w == self.delimiter)?;
            let frame: Vec<u8> = self.buf.drain(..pos + self.delimiter.len()).take(pos).collect();
            let frame = String::from_utf8_lossy(&frame).trim().to_string();
            if !frame.is_empty() {
                return Some(frame);
            }
        }
    }

    /// Whatever is left once the body has ended without a final delimiter
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buf).trim().to_string();
        self.buf.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multibyte_character() {
        let text = "नमस्ते\n".as_bytes();
        let mut buf = FrameBuffer::ndjson();
        buf.push(&text[..4]);
        assert_eq!(buf.next_frame(), None);
        buf.push(&text[4..]);
        assert_eq!(buf.next_frame().as_deref(), Some("नमस्ते"));
    }

    #[test]
    fn test_finish_returns_unterminated_tail() {
        let mut buf = FrameBuffer::ndjson();
        buf.push(b"{\"done\":true}");
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }
}
