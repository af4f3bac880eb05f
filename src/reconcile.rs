//! Message reconciliation.
//!
//! Merges the persisted message list with the live buffer into one
//! duplicate-free display sequence: `persisted ++ live_only`, each side
//! keeping its internal order. Persisted order is authoritative; live-only
//! messages are assumed newer and append at the end. No timestamp re-sort.

use std::collections::HashSet;

use crate::live::LiveBuffer;
use crate::model::{HistoryMessage, LiveMessage, Role};

/// One entry of the combined display sequence.
#[derive(Debug, Clone, Copy)]
pub enum DisplayMessage<'a> {
    Persisted(&'a HistoryMessage),
    Live(&'a LiveMessage),
}

impl<'a> DisplayMessage<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Self::Persisted(m) => &m.id,
            Self::Live(m) => &m.id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Persisted(m) => m.role,
            Self::Live(m) => m.role,
        }
    }

    pub fn content(&self) -> &'a str {
        match self {
            Self::Persisted(m) => &m.content,
            Self::Live(m) => &m.content,
        }
    }
}

/// A duplicate-free merged view over one snapshot and one live buffer.
#[derive(Debug)]
pub struct Reconciled<'a> {
    pub persisted: &'a [HistoryMessage],
    pub live_only: Vec<&'a LiveMessage>,
}

impl<'a> Reconciled<'a> {
    /// The combined display sequence.
    pub fn iter(&self) -> impl Iterator<Item = DisplayMessage<'a>> + '_ {
        self.persisted
            .iter()
            .map(DisplayMessage::Persisted)
            .chain(self.live_only.iter().copied().map(DisplayMessage::Live))
    }

    pub fn len(&self) -> usize {
        self.persisted.len() + self.live_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persisted.is_empty() && self.live_only.is_empty()
    }
}

/// Build the merged view.
///
/// Deduplication applies to user-role live messages only: a live user
/// message is dropped when its id matches a persisted id, or when its
/// trimmed content matches a persisted user message's trimmed content. The
/// content rule is the fallback correlation key for the client-id versus
/// server-id mismatch and can falsely merge two identical user turns; that
/// ambiguity is accepted, never raised as an error. Assistant live
/// messages are never deduplicated here — they are the in-progress
/// counterpart of content the store has not persisted yet.
pub fn reconcile<'a>(persisted: &'a [HistoryMessage], live: &'a LiveBuffer) -> Reconciled<'a> {
    let persisted_ids: HashSet<&str> = persisted.iter().map(|m| m.id.as_str()).collect();
    let persisted_user_content: HashSet<&str> = persisted
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .collect();

    let live_only = live
        .messages()
        .into_iter()
        .filter(|message| {
            if message.role != Role::User {
                return true;
            }
            !persisted_ids.contains(message.id.as_str())
                && !persisted_user_content.contains(message.content.trim())
        })
        .collect();

    Reconciled {
        persisted,
        live_only,
    }
}
