use super::logging::emit_sse_parse_error;
use crate::types::GenerateContentResponse;
use anyhow::{anyhow, Result};

/// Incremental parser for `streamGenerateContent?alt=sse` bodies.
///
/// Chunks may split events anywhere, including inside a UTF-8 sequence;
/// undecoded bytes are held until the rest of the event arrives.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    deferred_error: Option<anyhow::Error>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns every complete event it finished.
    ///
    /// Malformed JSON events are logged and skipped; an upstream `error`
    /// object ends the stream with an error. Events that precede the error
    /// in the same chunk are still returned, and the error is reported by
    /// the next call to `process` or `finish`. Nothing after the error is
    /// parsed.
    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<GenerateContentResponse>> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some((event_end, separator_len)) = find_event_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..event_end + separator_len).collect();
            let event_text = String::from_utf8_lossy(&raw[..event_end]);
            match parse_event(&event_text) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(error) => {
                    self.buffer.clear();
                    if events.is_empty() {
                        return Err(error);
                    }
                    self.deferred_error = Some(error);
                    break;
                }
            }
        }

        Ok(events)
    }

    /// Parses whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Result<Option<GenerateContentResponse>> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }
        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest);
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse_event(&text)
    }
}

/// Text fragments carried by one event, in part order.
pub fn event_fragments(event: &GenerateContentResponse) -> Vec<String> {
    event
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.clone())
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|pos| (pos, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_event(event_text: &str) -> Result<Option<GenerateContentResponse>> {
    let data: Vec<&str> = event_text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if data.is_empty() {
        return Ok(None);
    }

    let json_data = data.join("\n");
    if json_data.trim() == "[DONE]" {
        return Ok(None);
    }

    match serde_json::from_str::<GenerateContentResponse>(&json_data) {
        Ok(event) => match &event.error {
            Some(error) => Err(anyhow!("stream reported an error: {error}")),
            None => Ok(Some(event)),
        },
        Err(e) => {
            emit_sse_parse_error(&json_data, &e);
            Ok(None)
        }
    }
}
