use std::collections::VecDeque;

use bytes::BytesMut;

/// One dispatched server-sent event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub(crate) event: String,
    pub(crate) data: String,
}

/// Incremental decoder for a `text/event-stream` byte sequence.
///
/// Follows the EventSource framing rules: one field per line, a blank line
/// dispatches the pending event, `data:` lines accumulate joined by
/// newlines, and an event without an explicit name dispatches as `message`.
/// `id:`, `retry:` and unknown fields are skipped, as are `:` comments.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: BytesMut,
    event_name: String,
    data_lines: Vec<String>,
    ready: VecDeque<SseFrame>,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes; complete frames become available via `next_frame`.
    /// A frame left unterminated when the stream ends is never dispatched.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(line) = self.take_line() {
            self.consume_line(&line);
        }
    }

    pub(crate) fn next_frame(&mut self) -> Option<SseFrame> {
        self.ready.pop_front()
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&byte| byte == b'\n')?;
        let raw = self.buffer.split_to(pos + 1);
        let mut line = &raw[..pos];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }

    fn consume_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_name = value.to_string(),
            "data" => self.data_lines.push(value.to_string()),
            // id and retry drive browser reconnect bookkeeping; this
            // subscription never reconnects.
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event_name = std::mem::take(&mut self.event_name);
        // Fields without any data line dispatch nothing.
        if self.data_lines.is_empty() {
            return;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        let event = if event_name.is_empty() {
            "message".to_string()
        } else {
            event_name
        };
        self.ready.push_back(SseFrame { event, data });
    }
}
