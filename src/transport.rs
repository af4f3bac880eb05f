//! External collaborators: snapshot store and send-and-stream transport.
//!
//! The engine treats both as opaque. [`ChatStore`] returns atomic,
//! authoritative snapshots; [`ChatTransport`] opens the byte stream one
//! exchange consumes through [`crate::sse::EventChannel`]. The bundled
//! [`HttpTransport`] implements both against a REST-style backend.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ChatSnapshot, HistoryMessage};
use crate::tree::{Tree, TreeNode};

/// Raw byte stream of one exchange, as handed to the event channel.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

// ============================================================================
// Traits
// ============================================================================

/// Fetches the authoritative chat snapshot.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn fetch(&self, chat_id: &str) -> Result<ChatSnapshot>;
}

/// Opens the streaming channel for one send.
///
/// Connection setup, authentication header injection, and retry policy live
/// behind this trait; the engine only consumes the resulting byte stream.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, chat_id: &str, request: &SendRequest) -> Result<ByteStream>;
}

/// Body of a send: content plus an optional explicit parent for branching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

// ============================================================================
// Wire snapshot
// ============================================================================

/// Wire shape of a snapshot fetch response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub tree_structure: TreeNode,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub title: String,
    pub system_prompt: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl SnapshotPayload {
    /// Validate the tree and build the engine-side snapshot.
    pub fn into_snapshot(self) -> Result<ChatSnapshot> {
        Ok(ChatSnapshot {
            tree: Tree::new(self.tree_structure)?,
            messages: self.messages,
            title: self.title,
            system_prompt: self.system_prompt,
            metadata: self.metadata,
        })
    }
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Configuration for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Extra headers appended to every request.
    pub headers: Vec<(String, String)>,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// REST-style store + transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Use a preconfigured client (proxies, test harness).
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        request
    }
}

#[async_trait]
impl ChatStore for HttpTransport {
    async fn fetch(&self, chat_id: &str) -> Result<ChatSnapshot> {
        let url = format!("{}/chats/{chat_id}", self.config.base_url);
        let request = self.apply_headers(self.client.get(&url));

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!(
                "snapshot fetch failed (HTTP {status}): {body}"
            )));
        }

        let payload: SnapshotPayload = response.json().await?;
        payload.into_snapshot()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, chat_id: &str, request: &SendRequest) -> Result<ByteStream> {
        let url = format!("{}/chats/{chat_id}/messages", self.config.base_url);
        let builder = self
            .apply_headers(self.client.post(&url))
            .header("Accept", "text/event-stream")
            .json(request);

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!(
                "send failed (HTTP {status}): {body}"
            )));
        }

        let bytes = response.bytes_stream().map(|chunk| {
            chunk
                .map(|b| b.to_vec())
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
        });
        Ok(Box::pin(bytes))
    }
}
