//! Stream framing for the chat transport.
//!
//! Implements the line-oriented text protocol used by the send-and-stream
//! endpoint: `event:`/`data:` fields, blank-line block separation, a
//! `[DONE]` terminal sentinel, and JSON payloads that decode into typed
//! [`StreamEvent`] values. One malformed line is skipped, never fatal;
//! subsequent valid lines must survive it.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Deserialize;

use crate::model::{MessageDelta, Role, StreamEvent};

/// Terminal sentinel payload.
const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Frame payload
// ============================================================================

/// Raw JSON shape of a `data:` payload before event typing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FramePayload {
    id: Option<String>,
    role: Option<Role>,
    #[serde(default)]
    content: String,
    /// Explicit event name inside the payload; highest-priority type source.
    event: Option<String>,
    /// Legacy type field; consulted after the wire-level event tag.
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Error frames carry their text here.
    message: Option<String>,
}

// ============================================================================
// Parser
// ============================================================================

/// Incremental frame parser.
///
/// Bytes are buffered and split on `\n` (a trailing `\r` is tolerated); the
/// trailing, possibly-incomplete fragment is retained for the next read and
/// never parsed prematurely. A partial multi-byte UTF-8 sequence at a chunk
/// boundary is likewise retained until completed.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Decoded text awaiting a newline.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    utf8_tail: Vec<u8>,
    /// Tag from the most recent `event:` line, if any.
    current_tag: Option<String>,
    /// Set once `[DONE]` (or an equivalent typed frame) is seen; all
    /// subsequent input is ignored.
    finished: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal frame has been parsed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether undecoded or unframed input is pending.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || !self.utf8_tail.is_empty()
    }

    /// Feed raw bytes, reassembling UTF-8 across chunk boundaries.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.utf8_tail.extend_from_slice(bytes);
        let mut pending = std::mem::take(&mut self.utf8_tail);

        loop {
            match std::str::from_utf8(&pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    // Safe: prefix was just validated.
                    self.buffer
                        .push_str(std::str::from_utf8(&pending[..valid]).unwrap_or(""));
                    match err.error_len() {
                        Some(bad) => {
                            // Hard invalid sequence: skip it, keep going.
                            tracing::warn!(
                                target: "arbor::stream",
                                skipped = bad,
                                "dropping invalid UTF-8 bytes from stream"
                            );
                            pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete tail; wait for the next read.
                            pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        self.utf8_tail = pending;
        self.drain_lines()
    }

    /// Feed already-decoded text.
    pub fn feed(&mut self, text: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(text);
        self.drain_lines()
    }

    /// Flush at clean end-of-stream: a retained final line without a
    /// trailing newline is still framed.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        if !self.utf8_tail.is_empty() {
            tracing::warn!(
                target: "arbor::stream",
                bytes = self.utf8_tail.len(),
                "stream ended with incomplete UTF-8 sequence"
            );
            self.utf8_tail.clear();
        }
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        let line = line.trim_end_matches('\r');
        self.process_line(line).into_iter().collect()
    }

    /// Split buffered text into complete lines and frame each one.
    fn drain_lines(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let buffer = std::mem::take(&mut self.buffer);
        let mut start = 0usize;

        while let Some(rel) = memchr::memchr(b'\n', &buffer.as_bytes()[start..]) {
            let end = start + rel;
            let line = buffer[start..end].trim_end_matches('\r');
            start = end + 1;
            if self.finished {
                continue;
            }
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }

        self.buffer = buffer[start..].to_string();
        events
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            // Block boundary resets the tag to the default.
            self.current_tag = None;
            return None;
        }
        if let Some(tag) = line.strip_prefix("event:") {
            let tag = tag.strip_prefix(' ').unwrap_or(tag);
            self.current_tag = Some(tag.to_string());
            return None;
        }
        if let Some(payload) = line.strip_prefix("data:") {
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            return self.process_payload(payload);
        }
        // Comments and unknown fields are ignored.
        None
    }

    fn process_payload(&mut self, payload: &str) -> Option<StreamEvent> {
        if payload.trim() == DONE_SENTINEL {
            self.finished = true;
            return Some(StreamEvent::Done);
        }

        let frame: FramePayload = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(err) => {
                // One bad line must not lose subsequent valid lines.
                tracing::warn!(
                    target: "arbor::stream",
                    error = %err,
                    "skipping malformed frame"
                );
                return None;
            }
        };

        let event = self.typed_event(frame);
        // The tag applies to the data line it precedes, not to later blocks.
        self.current_tag = None;
        event
    }

    /// Resolve the event type and build the typed event.
    ///
    /// Priority: `event` field in the payload, then the current wire tag
    /// when it is `final`/`error`, then the payload's `type` field, then
    /// the default `chunk`.
    fn typed_event(&mut self, frame: FramePayload) -> Option<StreamEvent> {
        let tag = self
            .current_tag
            .as_deref()
            .filter(|t| *t == "final" || *t == "error");
        let kind = frame
            .event
            .as_deref()
            .or(tag)
            .or(frame.kind.as_deref())
            .unwrap_or("chunk");

        match kind {
            "chunk" => Some(StreamEvent::Chunk(delta_from(frame))),
            "final" => Some(StreamEvent::Final(delta_from(frame))),
            "error" => {
                let message = frame
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| {
                        if frame.content.is_empty() {
                            "stream error".to_string()
                        } else {
                            frame.content
                        }
                    });
                Some(StreamEvent::Error { message })
            }
            "done" => {
                self.finished = true;
                Some(StreamEvent::Done)
            }
            other => {
                // Keep-alives and future frame kinds pass through silently.
                tracing::trace!(target: "arbor::stream", kind = other, "ignoring frame");
                None
            }
        }
    }
}

/// Extract the message delta from a chunk/final frame. A frame without an
/// id still frames as an event (the id is left empty); the live buffer
/// decides whether it can be applied.
fn delta_from(frame: FramePayload) -> MessageDelta {
    MessageDelta {
        id: frame.id.unwrap_or_default(),
        role: frame.role,
        content: frame.content,
    }
}

// ============================================================================
// Event channel
// ============================================================================

/// Connection state of an [`EventChannel`], reported exactly once per
/// transition: both flags drop to false on teardown regardless of which
/// exit path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub connecting: bool,
    pub connected: bool,
}

/// One exchange's event stream.
///
/// Owns its reader, decoder, and buffer state, so a second send opening its
/// own channel can never corrupt this one. Yields typed [`StreamEvent`]s;
/// read-level failures surface as a single `Error` event after which the
/// channel is torn down. Nothing is emitted after an abort.
pub struct EventChannel<S> {
    inner: Option<S>,
    parser: StreamParser,
    pending: VecDeque<StreamEvent>,
    connecting: bool,
    connected: bool,
}

impl<S> EventChannel<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner: Some(inner),
            parser: StreamParser::new(),
            pending: VecDeque::new(),
            connecting: true,
            connected: false,
        }
    }

    pub fn state(&self) -> ChannelState {
        ChannelState {
            connecting: self.connecting,
            connected: self.connected,
        }
    }

    /// Release the reader and drop connection flags. Idempotent: the reader
    /// is released at most once, and repeated calls change nothing.
    fn teardown(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(target: "arbor::stream", "channel torn down");
        }
        self.connecting = false;
        self.connected = false;
    }

    /// Abort the exchange: tear down and discard anything not yet consumed,
    /// so no event fires after cancellation.
    pub fn abort(&mut self) {
        self.pending.clear();
        self.teardown();
    }
}

impl<S> futures::Stream for EventChannel<S>
where
    S: futures::Stream<Item = std::io::Result<Vec<u8>>> + Unpin,
{
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                if event.is_terminal() {
                    this.pending.clear();
                    this.teardown();
                }
                return Poll::Ready(Some(event));
            }

            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match Pin::new(inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.connecting = false;
                    this.connected = true;
                    this.pending.extend(this.parser.feed_bytes(&bytes));
                }
                Poll::Ready(Some(Err(err))) => {
                    this.teardown();
                    return Poll::Ready(Some(StreamEvent::Error {
                        message: err.to_string(),
                    }));
                }
                Poll::Ready(None) => {
                    this.pending.extend(this.parser.finish());
                    this.teardown();
                    // Loop back to drain anything the flush produced.
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
