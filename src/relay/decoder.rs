//! Line-oriented decoding of Ollama's streamed `/api/generate` body.
//!
//! The body is newline-delimited JSON:
//! ```text
//! {"model":"llama2","response":"He","done":false}
//! {"model":"llama2","response":"llo","done":false}
//! {"model":"llama2","response":"","done":true}
//! ```
//! Transport chunks do not respect line boundaries, so bytes are buffered
//! until a `\n` arrives. Splitting happens on raw bytes, which keeps
//! multi-byte UTF-8 characters intact when a chunk ends mid-character.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineParseError {
    #[error("line is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("line is not a valid generate record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one complete line that carried something worth forwarding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedLine {
    Fragment(String),
    /// The model server reported a failure in-band (`{"error": "..."}`).
    UpstreamError(String),
}

#[derive(Deserialize)]
struct GenerateRecord {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and decodes every line it completes, in order.
    /// A line that fails to parse yields an `Err` entry and does not affect its neighbours.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<DecodedLine, LineParseError>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(result) = decode_line(&self.buffer[start..end]) {
                decoded.push(result);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        decoded
    }

    /// Bytes received after the last newline.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Ends decoding. An unterminated trailing line is discarded, never parsed;
    /// the number of discarded non-whitespace bytes is returned.
    pub fn finish(self) -> usize {
        let trimmed = self.buffer.trim_ascii();
        trimmed.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<Result<DecodedLine, LineParseError>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    if line.is_empty() {
        return None;
    }

    let record = match serde_json::from_str::<GenerateRecord>(line) {
        Ok(record) => record,
        Err(e) => return Some(Err(e.into())),
    };

    if let Some(error) = record.error.filter(|e| !e.is_empty()) {
        return Some(Ok(DecodedLine::UpstreamError(error)));
    }

    record.response.filter(|r| !r.is_empty()).map(|r| Ok(DecodedLine::Fragment(r)))
}
