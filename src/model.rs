//! Message types, snapshots, and streaming events.
//!
//! These types are the shared "wire format" used across the engine:
//! - The transport streams [`StreamEvent`] values that incrementally build a reply.
//! - Snapshots carry the persisted [`HistoryMessage`] list parallel to the tree.
//! - The live buffer holds [`LiveMessage`] values for in-flight content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::Tree;

// ============================================================================
// Roles
// ============================================================================

/// Author of a message or tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

// ============================================================================
// Messages
// ============================================================================

/// A persisted message from the authoritative store.
///
/// Flat and order-stable; parallels the tree but is not itself hierarchical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

/// A transient in-flight message buffer.
///
/// Owned by the streaming side for the duration of one exchange and dropped
/// once the persisted snapshot is confirmed to contain its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl LiveMessage {
    /// Create an empty live message stamped with the current time.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            content: String::new(),
            is_complete: false,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Streaming Events
// ============================================================================

/// Incremental content for one message, carried by chunk and final frames.
///
/// Chunk content is a delta to append; final content is the authoritative
/// full text and replaces everything accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDelta {
    pub id: String,
    pub role: Option<Role>,
    pub content: String,
}

/// A typed event decoded from the stream channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental content to append to a live message.
    Chunk(MessageDelta),
    /// Authoritative final content for a live message.
    Final(MessageDelta),
    /// Transport or server failure; terminal.
    Error { message: String },
    /// Clean end-of-stream sentinel; terminal.
    Done,
}

impl StreamEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// An immutable full tree + message state returned by a fetch.
///
/// Supersedes any prior snapshot wholesale; the engine never merges
/// snapshots partially.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub tree: Tree,
    pub messages: Vec<HistoryMessage>,
    pub title: String,
    pub system_prompt: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
