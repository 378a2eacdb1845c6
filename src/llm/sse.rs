//! Incremental Server-Sent Events parser for the chat stream.
//!
//! Converts a byte stream into structured [`SseEvent`]s. Handles
//! multi-line `data:` fields, comment lines, CRLF endings, and the
//! `[DONE]` sentinel the chat endpoint uses to terminate a stream.

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from an `event:` field), if specified.
    pub event_type: Option<String>,
    /// The data payload; multiple `data:` lines are joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Accumulates field lines until an event boundary.
#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        event
    }

    /// Process one line. Returns a complete event at a blank-line
    /// boundary when data has accumulated.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.has_data() {
                return Some(self.build());
            }
            return None;
        }
        // Comment line per the SSE spec.
        if line.starts_with(':') {
            return None;
        }
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_owned()),
                "event" => self.event_type = Some(value.to_owned()),
                // id/retry and unknown fields are ignored.
                _ => {}
            }
        }
        None
    }
}

/// Split a line into (field, value), stripping the single space the SSE
/// spec allows after the colon.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let field = &line[..colon];
    let mut value = &line[colon + 1..];
    if let Some(stripped) = value.strip_prefix(' ') {
        value = stripped;
    }
    Some((field, value))
}

/// Incremental SSE parser fed with raw byte chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buffer: String,
    builder: EventBuilder,
}

impl SseParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning any events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let text = String::from_utf8_lossy(chunk);
        let mut events = Vec::new();
        for ch in text.chars() {
            if ch == '\n' {
                let mut line = std::mem::take(&mut self.line_buffer);
                if line.ends_with('\r') {
                    line.pop();
                }
                if let Some(event) = self.builder.process_line(&line) {
                    events.push(event);
                }
            } else {
                self.line_buffer.push(ch);
            }
        }
        events
    }

    /// Flush a trailing event left without a final blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.line_buffer.is_empty() {
            let mut line = std::mem::take(&mut self.line_buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.builder.process_line(&line) {
                return Some(event);
            }
        }
        if self.builder.has_data() {
            return Some(self.builder.build());
        }
        None
    }
}
