//! Incremental decoder for the `text/event-stream` format.
//!
//! Bytes arrive in arbitrary chunks; lines may end in LF, CR or CRLF and a
//! CRLF pair may be split across two chunks. Lines and events are bounded so
//! a misbehaving server cannot grow the buffers without limit.

use std::time::Duration;

use thiserror::Error;

/// Longest single line accepted, terminator excluded
pub const MAX_LINE_BYTES: usize = 1024 * 1024;
/// Largest event accepted, counting its name and joined data
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Event name, `"message"` when the server sent none
    pub event: String,
    pub data: String,
    /// Last event id seen on the stream at dispatch time
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SseError {
    #[error("event stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("event stream event exceeds {limit} bytes")]
    EventTooLarge { limit: usize },
}

#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    skip_lf: bool,
    started: bool,
    event: String,
    data: String,
    has_data: bool,
    /// Set by `id:` lines, committed when the event ends
    pending_id: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    max_line: usize,
    max_event: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limits(MAX_LINE_BYTES, MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_line: usize, max_event: usize) -> Self {
        Self {
            line: Vec::new(),
            skip_lf: false,
            started: false,
            event: String::new(),
            data: String::new(),
            has_data: false,
            pending_id: None,
            last_event_id: None,
            retry: None,
            max_line,
            max_event,
        }
    }

    /// Reconnection time most recently requested with `retry:`. Consumed on
    /// read.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Decode `chunk`, appending completed events to `out`. Events completed
    /// before an overflow stay in `out`; after an error the decoder must be
    /// [`reset`](Self::reset) before reuse.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<SseMessage>) -> Result<(), SseError> {
        let mut bytes = chunk;

        if !self.started && !bytes.is_empty() {
            self.started = true;
            if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
                bytes = rest;
            }
        }

        for &byte in bytes {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(out)?,
                b'\r' => {
                    self.skip_lf = true;
                    self.end_line(out)?;
                }
                other => {
                    if self.line.len() >= self.max_line {
                        return Err(SseError::LineTooLong {
                            limit: self.max_line,
                        });
                    }
                    self.line.push(other);
                }
            }
        }
        Ok(())
    }

    /// Forget any half-received event. Called when a connection drops; the
    /// last dispatched event id survives for the reconnect.
    pub fn reset(&mut self) {
        self.line.clear();
        self.skip_lf = false;
        self.started = false;
        self.event.clear();
        self.data.clear();
        self.has_data = false;
        self.pending_id = self.last_event_id.clone();
    }

    fn end_line(&mut self, out: &mut Vec<SseMessage>) -> Result<(), SseError> {
        let line = std::mem::take(&mut self.line);
        if line.is_empty() {
            self.dispatch(out);
            return Ok(());
        }
        if line[0] == b':' {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.pending_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }

        if self.event.len() + self.data.len() > self.max_event {
            return Err(SseError::EventTooLarge {
                limit: self.max_event,
            });
        }
        Ok(())
    }

    fn dispatch(&mut self, out: &mut Vec<SseMessage>) {
        self.last_event_id = self.pending_id.clone();
        let event = std::mem::take(&mut self.event);
        if !self.has_data {
            return;
        }
        self.has_data = false;
        out.push(SseMessage {
            event: if event.is_empty() {
                "message".to_string()
            } else {
                event
            },
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        });
    }
}
