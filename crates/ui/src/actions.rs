//! Tagged action variants dispatched through the store. Each names, in
//! its doc comment, the slice(s) whose reducer handles it; every other
//! reducer leaves its slice unchanged.

use threadline_agent::types::{ApprovalRequest, TopicMetadata};
use threadline_core::chat::ChatMessage;

use crate::slices::ConnectionStatus;

#[derive(Debug, Clone)]
pub enum Action {
    /// Handled by `Topics`.
    TopicUpserted(TopicMetadata),
    /// Handled by `Topics`, `Messages`, `Streaming`, `Approval`.
    TopicRemoved { topic_id: String },
    /// Handled by `Messages`.
    MessagesLoaded {
        topic_id: String,
        messages: Vec<ChatMessage>,
    },
    /// Handled by `Streaming`.
    StreamingStarted { topic_id: String, message_id: String },
    /// Handled by `Streaming`.
    StreamingDelta {
        topic_id: String,
        message_id: String,
        text: String,
    },
    /// Handled by `Streaming` and `Messages` together: clears the
    /// in-flight content for `topic_id` and appends `message` to its
    /// history, deduplicating on `message_id`.
    StreamingFinalized {
        topic_id: String,
        message_id: String,
        message: ChatMessage,
    },
    /// Handled by `Streaming`.
    StreamingResumed { topic_id: String },
    /// Handled by `Connection`.
    ConnectionStatusChanged(ConnectionStatus),
    /// Handled by `Approval`.
    ApprovalRequested {
        topic_id: String,
        request: ApprovalRequest,
    },
    /// Handled by `Approval`.
    ApprovalResolved { approval_id: String },
    /// Handled by `Space`.
    TopicSelected { topic_id: String },
    /// Dispatched by the reconnection effect; not handled by any
    /// reducer. The adapter that owns the transport is responsible for
    /// performing the actual reload — see `effects::reconnection`.
    HistoryReloadRequested { topic_id: String },
}
