//! Frame reassembly and lenient decoding.
//!
//! Network chunk boundaries are arbitrary with respect to logical event
//! boundaries, so "one chunk = one frame" is false. `LineBuffer` keeps
//! the reconstruction state across reads: bytes accumulate in a single
//! owned buffer, complete lines are drained on every push and the
//! trailing fragment waits for the next chunk.

use serde::de::DeserializeOwned;

/// Prefix that marks a line as an event frame.
pub const EVENT_PREFIX: &str = "data: ";

/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles newline-delimited lines from arbitrarily chunked bytes.
///
/// Owned by exactly one consumer worker; dropped when the stream closes
/// or aborts.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and drains every complete line. The final
    /// (possibly partial) fragment stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop(); // the newline itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    #[cfg(test)]
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// Outcome of decoding one complete line.
#[derive(Debug, PartialEq)]
pub enum FrameDecode<T> {
    /// A decoded event frame.
    Event(T),
    /// The stream's termination sentinel.
    Done,
    /// Not a frame, or an undecodable one. The line is dropped.
    Skip,
}

/// Lenient decode of one line into a frame.
///
/// Lines without the event prefix and payloads that fail JSON parsing
/// are skipped rather than surfaced as errors, so a frame split in an
/// unexpected place degrades gracefully instead of killing the session.
pub fn decode_frame<T: DeserializeOwned>(line: &str) -> FrameDecode<T> {
    let line = line.trim();
    if line.is_empty() {
        return FrameDecode::Skip;
    }

    let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
        tracing::debug!(line = %line, "dropping line without event prefix");
        return FrameDecode::Skip;
    };

    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return FrameDecode::Done;
    }

    match serde_json::from_str(payload) {
        Ok(event) => FrameDecode::Event(event),
        Err(err) => {
            tracing::debug!(payload = %payload, error = %err, "dropping undecodable frame");
            FrameDecode::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn complete_lines_drain_and_fragment_stays() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: {\"a\":1}\ndata: {\"b\"");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
        assert_eq!(buffer.pending(), b"data: {\"b\"");

        let lines = buffer.push(b":2}\n");
        assert_eq!(lines, vec!["data: {\"b\":2}".to_string()]);
        assert!(buffer.pending().is_empty());
    }

    #[test]
    fn one_chunk_may_carry_many_lines() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"one\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"data: {}\r\n");
        assert_eq!(lines, vec!["data: {}"]);
    }

    #[test]
    fn decode_event_sentinel_and_noise() {
        assert_eq!(
            decode_frame::<Value>("data: {\"type\":\"a\"}"),
            FrameDecode::Event(json!({"type": "a"}))
        );
        assert_eq!(decode_frame::<Value>("data: [DONE]"), FrameDecode::Done);
        assert_eq!(decode_frame::<Value>(""), FrameDecode::Skip);
        assert_eq!(decode_frame::<Value>(": keep-alive"), FrameDecode::Skip);
    }

    #[test]
    fn malformed_json_is_skipped_not_an_error() {
        assert_eq!(decode_frame::<Value>("data: {\"typ"), FrameDecode::Skip);
    }
}
