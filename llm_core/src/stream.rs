//! Record framing for streamed completions.
//!
//! Ollama sends newline-delimited JSON, OpenAI-compatible servers send
//! server-sent events. Both are line oriented, and a network chunk can end
//! anywhere, including inside a multi-byte character.

use serde::Deserialize;
use tracing::warn;

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the line
    /// terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// What one wire record means to the token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Token(String),
    /// Final text of a stream; nothing after it is read.
    Last(String),
    Done,
    /// The server reported a failure inside the stream.
    Failed(String),
    Skip,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

pub fn parse_ollama_line(line: &str) -> Record {
    let line = line.trim();
    if line.is_empty() {
        return Record::Skip;
    }
    match serde_json::from_str::<OllamaChunk>(line) {
        Ok(OllamaChunk { error: Some(e), .. }) => Record::Failed(e),
        Ok(chunk) if chunk.done => {
            if chunk.response.is_empty() {
                Record::Done
            } else {
                Record::Last(chunk.response)
            }
        }
        Ok(chunk) if chunk.response.is_empty() => Record::Skip,
        Ok(chunk) => Record::Token(chunk.response),
        Err(e) => {
            warn!(error = %e, "skipping malformed completion record");
            Record::Skip
        }
    }
}

#[derive(Deserialize)]
struct SseChunk {
    #[serde(default)]
    choices: Vec<SseChoice>,
    error: Option<SseError>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct SseError {
    message: String,
}

pub fn parse_sse_line(line: &str) -> Record {
    let Some(data) = line.strip_prefix("data:") else {
        // comments, `event:` and `id:` fields, blank separators
        return Record::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Record::Done;
    }
    match serde_json::from_str::<SseChunk>(data) {
        Ok(SseChunk { error: Some(e), .. }) => Record::Failed(e.message),
        Ok(chunk) => match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
            Some(text) if !text.is_empty() => Record::Token(text),
            _ => Record::Skip,
        },
        Err(e) => {
            warn!(error = %e, "skipping malformed event");
            Record::Skip
        }
    }
}
