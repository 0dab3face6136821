//! Server-sent-event line handling shared by the upstream parser and the client decoder.

use memchr::memchr;
use serde::Deserialize;

/// Terminator payload of an event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Accumulates raw bytes and yields complete lines.
///
/// Chunk boundaries are arbitrary: a line, or a multi-byte character, may be
/// split across chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk and drain every complete line, without its line ending.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            match std::str::from_utf8(&line) {
                Ok(text) => lines.push(text.trim_end_matches(['\r', '\n']).to_string()),
                Err(err) => tracing::warn!("dropping non UTF-8 stream line: {err}"),
            }
        }
        lines
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        String::from_utf8(rest)
            .ok()
            .map(|text| text.trim_end_matches('\r').to_string())
            .filter(|text| !text.trim().is_empty())
    }
}

/// Payload of a `data:` line, accepting both `data:x` and `data: x`.
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Meaning of one line of an OpenAI-compatible completion stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpstreamLine {
    /// A text delta.
    Delta(String),
    /// The `[DONE]` terminator.
    Done,
    /// An in-band error payload.
    Error(String),
    /// Comments, blank lines, role-only or empty deltas.
    Skip,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Classify one upstream line.
#[must_use]
pub fn parse_upstream_line(line: &str) -> UpstreamLine {
    let Some(payload) = data_payload(line.trim()) else {
        return UpstreamLine::Skip;
    };
    if payload == DONE_SENTINEL {
        return UpstreamLine::Done;
    }
    if payload.is_empty() {
        return UpstreamLine::Skip;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return UpstreamLine::Error(format!("unparseable stream payload: {payload}"));
    };
    if value.get("error").is_some() {
        return UpstreamLine::Error(
            extract_error_summary(&value).unwrap_or_else(|| payload.to_string()),
        );
    }

    match serde_json::from_value::<CompletionChunk>(value) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map_or(UpstreamLine::Skip, UpstreamLine::Delta),
        Err(err) => UpstreamLine::Error(format!("unexpected stream payload: {err}")),
    }
}

/// Pull a one-line summary out of an OpenAI-style error body.
#[must_use]
pub fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_owned)
        })?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed)
}
