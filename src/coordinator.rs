//! Exchange orchestration.
//!
//! The coordinator owns one chat session's moving parts and sequences the
//! cycle the components individually cannot: preserve selection, stream
//! the reply into the live buffer, wait out persistence, reload the
//! authoritative snapshot, then restore or re-derive the selection against
//! the new tree. Cycles for the same chat never overlap; a second send
//! while one is pending is rejected outright.

use std::time::Duration;

use futures::StreamExt;

use crate::error::{Error, Result};
use crate::layout::{layout, LayoutConfig, RenderNode};
use crate::live::LiveBuffer;
use crate::model::{ChatSnapshot, StreamEvent};
use crate::navigation::NavigationState;
use crate::reconcile::{reconcile, Reconciled};
use crate::sse::EventChannel;
use crate::transport::{ChatStore, ChatTransport, SendRequest};

/// Delay between stream completion and the snapshot refetch, giving the
/// backend time to finish persisting the exchange.
const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(500);

/// Progress notifications surfaced to the caller during one exchange.
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    /// The stream channel is open.
    StreamStart,
    /// A live message changed; re-render from [`Coordinator::view`].
    LiveUpdate { id: String },
    /// The stream ended cleanly.
    StreamEnd,
    /// The stream ended with a transport failure.
    TransportError { message: String },
    /// The fresh snapshot replaced the old one.
    Reloaded,
    /// Post-reload selection is settled (restored or re-derived).
    SelectionSettled { id: Option<String> },
}

/// Orchestrates one chat session against a store and a transport.
pub struct Coordinator<S, T> {
    store: S,
    transport: T,
    chat_id: String,
    snapshot: Option<ChatSnapshot>,
    nav: NavigationState,
    live: LiveBuffer,
    exchange_pending: bool,
    reload_delay: Duration,
}

impl<S, T> Coordinator<S, T>
where
    S: ChatStore,
    T: ChatTransport,
{
    pub fn new(store: S, transport: T, chat_id: impl Into<String>) -> Self {
        Self {
            store,
            transport,
            chat_id: chat_id.into(),
            snapshot: None,
            nav: NavigationState::new(),
            live: LiveBuffer::new(),
            exchange_pending: false,
            reload_delay: DEFAULT_RELOAD_DELAY,
        }
    }

    #[must_use]
    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn snapshot(&self) -> Option<&ChatSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.nav
    }

    pub fn live(&self) -> &LiveBuffer {
        &self.live
    }

    pub fn is_exchange_pending(&self) -> bool {
        self.exchange_pending
    }

    /// Load (or reload) the chat from the store and auto-select the latest
    /// assistant leaf.
    pub async fn load(&mut self) -> Result<()> {
        let snapshot = self.store.fetch(&self.chat_id).await?;
        tracing::debug!(
            target: "arbor::coordinator",
            chat = %self.chat_id,
            nodes = snapshot.tree.node_count(),
            "snapshot loaded"
        );
        self.nav = NavigationState::new();
        self.live.clear();
        self.nav.auto_select_latest(&snapshot.tree);
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Select a node in the current tree. Returns whether the id resolved;
    /// an unresolved selection is kept but has an empty path.
    pub fn select(&mut self, id: &str) -> bool {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return false;
        };
        self.nav.select(id, &snapshot.tree);
        snapshot.tree.find(id).is_some()
    }

    /// Whether the next send would branch rather than continue.
    pub fn is_branching(&self) -> bool {
        self.snapshot
            .as_ref()
            .map_or(false, |s| self.nav.is_branching(&s.tree))
    }

    /// The duplicate-free display sequence for the current state.
    pub fn view(&self) -> Reconciled<'_> {
        let persisted = self
            .snapshot
            .as_ref()
            .map_or(&[][..], |s| s.messages.as_slice());
        reconcile(persisted, &self.live)
    }

    /// Render coordinates for the current tree.
    pub fn layout(&self, config: &LayoutConfig) -> Vec<RenderNode> {
        self.snapshot
            .as_ref()
            .map(|s| layout(&s.tree, config))
            .unwrap_or_default()
    }

    /// Run one full exchange: send `content`, stream the reply, reload,
    /// restore selection.
    ///
    /// In branching mode the message is parented to the selected node;
    /// otherwise the parent is left unset and the backend continues from
    /// the latest leaf. A transport failure still reloads and settles the
    /// selection — the error is returned after the session state is
    /// consistent again.
    pub async fn send(
        &mut self,
        content: &str,
        model_id: Option<String>,
        mut on_event: impl FnMut(ExchangeEvent),
    ) -> Result<()> {
        if self.exchange_pending {
            return Err(Error::ExchangeInProgress {
                chat_id: self.chat_id.clone(),
            });
        }
        let parent_id = {
            let Some(snapshot) = self.snapshot.as_ref() else {
                return Err(Error::config("chat not loaded; call load() first"));
            };
            let parent = if self.nav.is_branching(&snapshot.tree) {
                self.nav.selected_id().map(str::to_string)
            } else {
                None
            };
            self.nav.preserve_for_streaming(&snapshot.tree);
            parent
        };

        self.exchange_pending = true;
        let result = self
            .run_exchange(content, parent_id, model_id, &mut on_event)
            .await;
        self.exchange_pending = false;
        result
    }

    async fn run_exchange(
        &mut self,
        content: &str,
        parent_id: Option<String>,
        model_id: Option<String>,
        on_event: &mut dyn FnMut(ExchangeEvent),
    ) -> Result<()> {
        self.live.insert_user(content);

        let request = SendRequest {
            content: content.to_string(),
            parent_id,
            model_id,
        };
        let bytes = self.transport.open(&self.chat_id, &request).await?;
        let mut channel = EventChannel::new(bytes);
        on_event(ExchangeEvent::StreamStart);

        let mut transport_failure = None;
        while let Some(event) = channel.next().await {
            self.live.apply(&event);
            match event {
                StreamEvent::Chunk(delta) | StreamEvent::Final(delta) => {
                    on_event(ExchangeEvent::LiveUpdate { id: delta.id });
                }
                StreamEvent::Error { message } => {
                    tracing::warn!(
                        target: "arbor::coordinator",
                        chat = %self.chat_id,
                        error = %message,
                        "exchange failed in transit"
                    );
                    on_event(ExchangeEvent::TransportError {
                        message: message.clone(),
                    });
                    transport_failure = Some(message);
                }
                StreamEvent::Done => on_event(ExchangeEvent::StreamEnd),
            }
        }

        // Give the backend time to finish persisting before refetching.
        tokio::time::sleep(self.reload_delay).await;

        let snapshot = self.store.fetch(&self.chat_id).await?;
        self.live.prune_persisted(&snapshot.messages);
        self.snapshot = Some(snapshot);
        on_event(ExchangeEvent::Reloaded);

        if let Some(snapshot) = self.snapshot.as_ref() {
            // Restore strictly against the fresh tree, never the old one.
            self.nav.clear();
            if !self.nav.restore_preserved(&snapshot.tree, true) {
                self.nav.auto_select_latest(&snapshot.tree);
            }
        }
        on_event(ExchangeEvent::SelectionSettled {
            id: self.nav.selected_id().map(str::to_string),
        });

        match transport_failure {
            Some(message) => Err(Error::transport(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ByteStream;
    use async_trait::async_trait;

    struct NoStore;

    #[async_trait]
    impl ChatStore for NoStore {
        async fn fetch(&self, _chat_id: &str) -> Result<ChatSnapshot> {
            Err(Error::api("unreachable in this test"))
        }
    }

    #[async_trait]
    impl ChatTransport for NoStore {
        async fn open(&self, _chat_id: &str, _request: &SendRequest) -> Result<ByteStream> {
            Err(Error::api("unreachable in this test"))
        }
    }

    #[tokio::test]
    async fn test_send_requires_loaded_snapshot() {
        let mut coordinator = Coordinator::new(NoStore, NoStore, "chat-1");
        let result = coordinator.send("hi", None, |_| {}).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(!coordinator.is_exchange_pending());
    }

    #[tokio::test]
    async fn test_view_is_empty_before_load() {
        let coordinator = Coordinator::new(NoStore, NoStore, "chat-1");
        assert!(coordinator.view().is_empty());
        assert!(coordinator.layout(&LayoutConfig::default()).is_empty());
        assert!(!coordinator.is_branching());
    }
}
