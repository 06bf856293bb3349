//! Minimal server-sent events line decoder.

/// Splits a byte stream into SSE `data:` payloads. Bytes are buffered until a
/// full line is available, so payloads split across network chunks (or
/// across a multi-byte character) come out whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns the payloads of every completed `data:` line.
    /// Comments, blank lines and other fields are skipped.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            payloads.extend(data_payload(&line));
        }
        payloads
    }

    /// Ends the stream, returning the payload of a final `data:` line that
    /// was not terminated by a newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }

    /// Bytes received after the last complete line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
}
