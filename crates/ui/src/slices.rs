//! The six slices of [`UIState`]. Each is an immutable record: a reducer
//! never mutates one in place, it returns a new `Arc` wrapping the
//! changed fields. Unchanged slices keep their existing `Arc`, which is
//! what makes reference-equality memoization in [`crate::selectors`]
//! sound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use threadline_agent::types::{ApprovalRequest, TopicMetadata};
use threadline_core::chat::ChatMessage;

/// Topic metadata, keyed by topic id.
#[derive(Debug, Clone, Default)]
pub struct TopicsState {
    pub topics: HashMap<String, TopicMetadata>,
}

/// Per-topic message history plus the set of topics whose history has
/// been loaded from the backend at least once.
#[derive(Debug, Clone, Default)]
pub struct MessagesState {
    pub by_topic: HashMap<String, Vec<ChatMessage>>,
    pub loaded: HashSet<String>,
    /// Streaming message ids already appended to `by_topic`, per topic —
    /// lets a late-arriving duplicate `StreamingFinalized` notification
    /// for the same id be dropped instead of appended twice.
    pub finalized_ids: HashMap<String, HashSet<String>>,
}

/// In-flight streamed content for one topic, keyed by the streaming
/// message id so a finalize for an id already cleared is a no-op.
#[derive(Debug, Clone)]
pub struct StreamingContent {
    pub message_id: String,
    pub text: String,
}

/// Per-topic in-flight content plus the streaming/resuming topic sets.
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    pub content: HashMap<String, StreamingContent>,
    pub streaming: HashSet<String>,
    pub resuming: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// `ever_connected` is what lets the reconnection effect (§effects)
/// distinguish the very first `Connected` transition — which happens on
/// every page load — from a genuine reconnection after a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub ever_connected: bool,
}

/// Pending tool-approval requests, keyed by approval id.
#[derive(Debug, Clone, Default)]
pub struct ApprovalState {
    pub pending: HashMap<String, PendingApproval>,
}

#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub topic_id: String,
    pub request: ApprovalRequest,
}

/// The currently selected topic (the browser's "workspace" view).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpaceState {
    pub active_topic: Option<String>,
}

/// The full store snapshot: one `Arc` per slice so a reducer touching
/// only one slice leaves the other five pointer-identical to the prior
/// snapshot.
#[derive(Debug, Clone)]
pub struct UIState {
    pub topics: Arc<TopicsState>,
    pub messages: Arc<MessagesState>,
    pub streaming: Arc<StreamingState>,
    pub connection: Arc<ConnectionState>,
    pub approval: Arc<ApprovalState>,
    pub space: Arc<SpaceState>,
}

impl Default for UIState {
    fn default() -> Self {
        Self {
            topics: Arc::new(TopicsState::default()),
            messages: Arc::new(MessagesState::default()),
            streaming: Arc::new(StreamingState::default()),
            connection: Arc::new(ConnectionState::default()),
            approval: Arc::new(ApprovalState::default()),
            space: Arc::new(SpaceState::default()),
        }
    }
}
