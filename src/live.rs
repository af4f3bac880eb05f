//! Live-message buffer for one in-flight exchange.
//!
//! The buffer is the only state written by the stream handler and read by
//! the display layer. Entry updates go through remove-then-insert so a
//! consumer holding a reference never observes a half-applied entry, and
//! the whole map is replaced rather than mutated when an entry changes.

use std::collections::HashMap;

use crate::model::{HistoryMessage, LiveMessage, MessageDelta, Role, StreamEvent};

/// Map of in-flight messages keyed by id.
///
/// Owned exclusively by the streaming side for the duration of one
/// exchange; entries are pruned once a reloaded snapshot is confirmed to
/// contain their content.
#[derive(Debug, Clone, Default)]
pub struct LiveBuffer {
    messages: HashMap<String, LiveMessage>,
}

impl LiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one stream event.
    ///
    /// Chunk content accumulates; final content replaces outright (it is
    /// the authoritative full text, not a delta) and marks the entry
    /// complete. Error and done events do not touch the buffer.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Chunk(delta) => self.upsert(delta, false),
            StreamEvent::Final(delta) => self.upsert(delta, true),
            StreamEvent::Error { .. } | StreamEvent::Done => {}
        }
    }

    fn upsert(&mut self, delta: &MessageDelta, is_final: bool) {
        if delta.id.is_empty() {
            // Frame carried no message id; nothing to key the entry on.
            tracing::debug!(target: "arbor::live", "ignoring delta without message id");
            return;
        }
        // Remove-then-insert: never mutate an entry in place.
        let mut message = self
            .messages
            .remove(&delta.id)
            .unwrap_or_else(|| {
                LiveMessage::new(
                    delta.id.clone(),
                    delta.role.unwrap_or(Role::Assistant),
                )
            });
        if is_final {
            message.content = delta.content.clone();
            message.is_complete = true;
        } else {
            message.content.push_str(&delta.content);
        }
        self.messages.insert(delta.id.clone(), message);
    }

    /// Register the just-sent user message so it renders while streaming.
    /// Returns the client-generated id.
    pub fn insert_user(&mut self, content: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut message = LiveMessage::new(id.clone(), Role::User);
        message.content = content.to_string();
        message.is_complete = true;
        self.messages.insert(id.clone(), message);
        id
    }

    pub fn get(&self, id: &str) -> Option<&LiveMessage> {
        self.messages.get(id)
    }

    /// All live messages ordered by creation time (id as tiebreak).
    pub fn messages(&self) -> Vec<&LiveMessage> {
        let mut all: Vec<&LiveMessage> = self.messages.values().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    /// Drop every entry the persisted list now contains: matched by id, or
    /// by trimmed content for the same role (the backend assigns its own
    /// ids, so content is the fallback correlation key).
    ///
    /// Entries the snapshot does not account for stay live — a partial
    /// assistant reply after a transport failure keeps rendering rather
    /// than vanishing.
    pub fn prune_persisted(&mut self, persisted: &[HistoryMessage]) {
        self.messages.retain(|id, live| {
            let duplicated = persisted.iter().any(|p| {
                p.id == *id || (p.role == live.role && p.content.trim() == live.content.trim())
            });
            !duplicated
        });
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, content: &str) -> StreamEvent {
        StreamEvent::Chunk(MessageDelta {
            id: id.to_string(),
            role: None,
            content: content.to_string(),
        })
    }

    fn final_event(id: &str, content: &str) -> StreamEvent {
        StreamEvent::Final(MessageDelta {
            id: id.to_string(),
            role: None,
            content: content.to_string(),
        })
    }

    #[test]
    fn test_chunks_accumulate_final_replaces() {
        let mut buffer = LiveBuffer::new();
        buffer.apply(&chunk("a", "こ"));
        buffer.apply(&chunk("a", "ん"));
        assert_eq!(buffer.get("a").unwrap().content, "こん");
        assert!(!buffer.get("a").unwrap().is_complete);

        buffer.apply(&final_event("a", "こんにちは"));
        assert_eq!(buffer.len(), 1, "never two entries for one id");
        let message = buffer.get("a").unwrap();
        assert_eq!(message.content, "こんにちは");
        assert!(message.is_complete);
    }

    #[test]
    fn test_first_chunk_creates_assistant_entry() {
        let mut buffer = LiveBuffer::new();
        buffer.apply(&chunk("a", "hi"));
        assert_eq!(buffer.get("a").unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_final_without_prior_chunks() {
        let mut buffer = LiveBuffer::new();
        buffer.apply(&final_event("a", "whole"));
        let message = buffer.get("a").unwrap();
        assert_eq!(message.content, "whole");
        assert!(message.is_complete);
    }

    #[test]
    fn test_delta_without_id_ignored() {
        let mut buffer = LiveBuffer::new();
        buffer.apply(&chunk("", "floating"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_terminal_events_leave_buffer_alone() {
        let mut buffer = LiveBuffer::new();
        buffer.apply(&chunk("a", "hi"));
        buffer.apply(&StreamEvent::Done);
        buffer.apply(&StreamEvent::Error {
            message: "x".to_string(),
        });
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_messages_ordered_by_creation() {
        let mut buffer = LiveBuffer::new();
        let user_id = buffer.insert_user("question");
        buffer.apply(&chunk("reply", "answer"));
        let ordered: Vec<&str> = buffer.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ordered, [user_id.as_str(), "reply"]);
    }

    #[test]
    fn test_prune_by_id_and_by_content() {
        let mut buffer = LiveBuffer::new();
        buffer.insert_user("  hello  ");
        buffer.apply(&final_event("a", "reply text"));
        buffer.apply(&chunk("partial", "unfinished"));

        let persisted = vec![
            HistoryMessage {
                id: "server-u1".to_string(),
                role: Role::User,
                content: "hello".to_string(),
            },
            HistoryMessage {
                id: "a".to_string(),
                role: Role::Assistant,
                content: "reply text".to_string(),
            },
        ];
        buffer.prune_persisted(&persisted);

        // User matched by content, assistant by id; the unpersisted
        // partial survives.
        assert_eq!(buffer.len(), 1);
        assert!(buffer.get("partial").is_some());
    }
}
