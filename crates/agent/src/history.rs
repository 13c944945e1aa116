//! Persisted chat history: wraps a `SessionStore` keyed by
//! `ConversationKey::history_key()` rather than by raw `SessionId`, so the
//! orchestration engine never has to think about session lifecycle.

use std::sync::Arc;

use threadline_core::chat::ChatMessage;
use threadline_core::session::{Session, SessionEntry, SessionId, SessionStore, SessionStoreError};
use threadline_core::ToolCall;

use crate::types::ConversationKey;

pub struct ChatHistoryStore {
    store: Arc<dyn SessionStore>,
}

impl ChatHistoryStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn session_id(key: &ConversationKey) -> SessionId {
        SessionId::from_str(&key.history_key())
    }

    /// Loads the persisted message history for `key`, creating an empty
    /// session on first use. Non-message entries (tool-call attempts,
    /// failures) are kept in the store for audit/search but are not part
    /// of the chat transcript handed to the LM.
    pub async fn load(&self, key: &ConversationKey) -> Result<Vec<ChatMessage>, SessionStoreError> {
        let id = Self::session_id(key);
        let session = match self.store.get_session(&id).await? {
            Some(session) => session,
            None => {
                let mut session = Session::new();
                session.id = id;
                self.store.create_session(session.clone()).await?;
                session
            }
        };

        Ok(session
            .entries
            .into_iter()
            .filter_map(|(_, entry)| match entry {
                SessionEntry::Message(message) => Some(message),
                _ => None,
            })
            .collect())
    }

    pub async fn append_message(
        &self,
        key: &ConversationKey,
        message: ChatMessage,
    ) -> Result<(), SessionStoreError> {
        self.store
            .add_session_entry(&Self::session_id(key), SessionEntry::Message(message))
            .await
    }

    pub async fn append_tool_call(
        &self,
        key: &ConversationKey,
        call: ToolCall,
    ) -> Result<(), SessionStoreError> {
        self.store
            .add_session_entry(&Self::session_id(key), SessionEntry::ToolCallAttempt(call))
            .await
    }

    pub async fn append_failure(
        &self,
        key: &ConversationKey,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), SessionStoreError> {
        self.store
            .add_session_entry(
                &Self::session_id(key),
                SessionEntry::LLMFailure(operation.into(), message.into()),
            )
            .await
    }

    /// Wipes a conversation's persisted history entirely — the effective
    /// behavior of the `/clear` command (see design notes for why this
    /// differs from `/cancel`, which only stops the in-flight run).
    pub async fn clear(&self, key: &ConversationKey) -> Result<(), SessionStoreError> {
        self.store.delete_session(&Self::session_id(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::session::InMemorySessionStore;

    #[tokio::test]
    async fn load_creates_empty_session_on_first_use() {
        let history = ChatHistoryStore::new(Arc::new(InMemorySessionStore::new()));
        let key = ConversationKey::new(1, 1, "librarian");
        let messages = history.load(&key).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn appended_messages_round_trip_through_load() {
        let history = ChatHistoryStore::new(Arc::new(InMemorySessionStore::new()));
        let key = ConversationKey::new(1, 1, "librarian");
        history.load(&key).await.unwrap();
        history
            .append_message(&key, ChatMessage::user().content("hi").build())
            .await
            .unwrap();
        history
            .append_message(&key, ChatMessage::assistant().content("hello").build())
            .await
            .unwrap();

        let messages = history.load(&key).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn clear_wipes_persisted_history() {
        let history = ChatHistoryStore::new(Arc::new(InMemorySessionStore::new()));
        let key = ConversationKey::new(2, 2, "librarian");
        history.load(&key).await.unwrap();
        history
            .append_message(&key, ChatMessage::user().content("hi").build())
            .await
            .unwrap();

        history.clear(&key).await.unwrap();
        let messages = history.load(&key).await.unwrap();
        assert!(messages.is_empty());
    }
}
