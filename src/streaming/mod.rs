//! SSE (Server-Sent Events) streaming utilities
//!
//! Decoding of the upstream event stream and encoding of the OpenAI-style
//! stream sent back to clients.

pub mod encoder;

pub use encoder::{
    build_completion, completion_usage, encode_stream, ResponseMeta, StreamEncoder,
};

/// Buffer for accumulating incomplete SSE lines across chunk boundaries.
///
/// SSE data arrives as byte chunks that may not align with line boundaries.
/// Blank lines are kept because they delimit events. A trailing `\r` is
/// stripped so `\r\n` streams decode the same as `\n` streams.
///
/// # Example
/// ```
/// use replicate_bridge::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
///
/// // First chunk contains partial line
/// let lines1 = buffer.feed(b"data: hel");
/// assert!(lines1.is_empty()); // No complete lines yet
///
/// // Second chunk completes the line and the event
/// let lines2 = buffer.feed(b"lo\n\n");
/// assert_eq!(lines2, vec!["data: hello", ""]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Accumulated bytes of the incomplete line
    incomplete: Vec<u8>,
}

impl SseLineBuffer {
    /// Create a new empty buffer
    pub fn new() -> Self {
        Self {
            incomplete: Vec::new(),
        }
    }

    /// Feed bytes into the buffer and return any complete lines.
    ///
    /// Bytes are only decoded once a full line is available, so multi-byte
    /// UTF-8 characters split across chunks survive intact.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.incomplete.extend_from_slice(bytes);

        let mut complete_lines = Vec::new();
        while let Some(newline_pos) = self.incomplete.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.incomplete.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            complete_lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        complete_lines
    }

    /// Check if there's any incomplete data remaining in the buffer.
    ///
    /// Useful for detecting truncated streams at end of response.
    pub fn has_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name, `message` when the stream did not name one
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
}

/// Incremental SSE event decoder
///
/// Follows the EventSource field rules: `event:` names the event, each
/// `data:` line appends to the payload, lines starting with `:` are
/// comments, and a blank line dispatches the event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    lines: SseLineBuffer,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        for line in self.lines.feed(bytes) {
            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line.as_str(), ""),
            };

            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                // id and retry carry nothing the bridge needs
                _ => {}
            }
        }

        frames
    }

    /// Whether a partially received event is pending
    pub fn has_pending(&self) -> bool {
        self.lines.has_incomplete() || self.event.is_some() || !self.data.is_empty()
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
