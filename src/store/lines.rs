//! Incremental newline-delimited line splitter for streamed HTTP bodies.
//!
//! Chunks may end mid-line or mid UTF-8 sequence, so bytes are buffered
//! until a `\n` arrives and only complete lines are decoded.

#[derive(Debug, Default)]
pub(crate) struct LineParser {
    buffer: Vec<u8>,
}

impl LineParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning every line completed by it.
    ///
    /// Blank lines are skipped and a trailing `\r` is stripped.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.buffer);
                if let Some(line) = decode_line(&raw) {
                    lines.push(line);
                }
            } else {
                self.buffer.push(byte);
            }
        }
        lines
    }

    /// Emit whatever is left once the stream has ended.
    pub(crate) fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        decode_line(&raw)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_owned())
    }
}
