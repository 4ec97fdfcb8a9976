//! Incremental decoder for OpenAI-style `text/event-stream` bodies.
//!
//! Network chunks split lines (and UTF-8 sequences) at arbitrary points, so
//! bytes are buffered until a full line is available.

use std::mem;

use serde::Deserialize;

use ragstream_shared::{RagstreamError, Result};

/// One meaningful line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Non-empty `choices[0].delta.content`.
    Delta(String),
    /// `data: [DONE]`.
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Longest line the decoder will buffer before giving up on the stream.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Frames decoded from one push, plus the error that stopped decoding.
#[derive(Debug, Default)]
pub struct Decoded {
    pub frames: Vec<Frame>,
    pub error: Option<RagstreamError>,
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and decode every line they complete.
    ///
    /// Frames preceding a bad line are kept; decoding stops at the first error.
    pub fn push(&mut self, bytes: &[u8]) -> Decoded {
        self.buffer.extend_from_slice(bytes);

        let mut decoded = Decoded::default();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_line(&String::from_utf8_lossy(&line)) {
                Ok(Some(frame)) => decoded.frames.push(frame),
                Ok(None) => {}
                Err(e) => {
                    self.buffer.clear();
                    decoded.error = Some(e);
                    return decoded;
                }
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            decoded.error = Some(RagstreamError::Generation(format!(
                "stream line exceeds {MAX_LINE_BYTES} bytes"
            )));
        }
        decoded
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Option<Frame>> {
        let rest = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Result<Option<Frame>> {
    let line = line.trim();
    // Blank separators, `:` keep-alive comments, and `event:`/`id:` fields.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(Frame::Done));
    }

    let chunk: ChunkBody = serde_json::from_str(data).map_err(|e| {
        RagstreamError::Generation(format!("undecodable stream chunk: {e}"))
    })?;

    if let Some(err) = chunk.error {
        return Err(RagstreamError::Generation(format!(
            "model error mid-stream: {}",
            err.message
        )));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map(Frame::Delta))
}
