//! Chunk-to-line assembly for subprocess output
//!
//! Reads arrive in arbitrary chunks: a line (or a multi-byte character) may
//! be split across two of them. Bytes are buffered until a newline arrives,
//! and the remainder is flushed when the stream ends.

use crate::event::DeployEvent;

#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed. Blank lines are
    /// dropped and a trailing `\r` is stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(line) = decode(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the incomplete final line, if any
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode(&rest)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn decode(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    let line = String::from_utf8_lossy(bytes);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}

/// Turns raw output chunks into deployment events
#[derive(Debug, Default)]
pub struct EventDecoder {
    lines: LineAssembler,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<DeployEvent> {
        self.lines
            .push(chunk)
            .iter()
            .map(|l| DeployEvent::from_line(l))
            .collect()
    }

    pub fn finish(&mut self) -> Option<DeployEvent> {
        self.lines.finish().map(|l| DeployEvent::from_line(&l))
    }

    /// Decode a complete buffer in one go
    pub fn decode_all(input: &[u8]) -> Vec<DeployEvent> {
        let mut decoder = Self::new();
        let mut events = decoder.push(input);
        events.extend(decoder.finish());
        events
    }
}
