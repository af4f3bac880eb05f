//! Arbor - branching conversation engine
//!
//! A chat history here is a tree: any prior message can parent a new
//! branch, so one conversation holds many leaves. The hard part is keeping
//! a consistent view of "where the user is" while a reply streams in and
//! the authoritative history is then replaced wholesale by a reload. The
//! crate covers:
//! - [`tree`]: the immutable conversation tree snapshot and traversals
//! - [`navigation`]: selection, branching detection, preserve/restore
//!   across a reload
//! - [`sse`]: framing the streaming wire protocol into typed events
//! - [`live`] + [`reconcile`]: merging in-flight messages with persisted
//!   history without duplicates
//! - [`layout`]: render coordinates for the tree
//! - [`coordinator`]: the send -> stream -> reload -> restore cycle
//!
//! Rendering, authentication, and resource CRUD are external collaborators
//! behind the [`transport`] traits.

#![forbid(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod coordinator;
pub mod error;
pub mod layout;
pub mod live;
pub mod model;
pub mod navigation;
pub mod reconcile;
pub mod sse;
pub mod transport;
pub mod tree;

pub use coordinator::{Coordinator, ExchangeEvent};
pub use error::{Error, Result};
pub use model::{ChatSnapshot, HistoryMessage, LiveMessage, MessageDelta, Role, StreamEvent};
pub use navigation::NavigationState;
pub use tree::{Tree, TreeNode};
