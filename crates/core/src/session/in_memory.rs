use super::{Session, SessionEntry, SessionId, SessionStore, SessionStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// An in-memory implementation of the `SessionStore` trait.
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl InMemorySessionStore {
    /// Creates a new `InMemorySessionStore`.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .insert(session.id.clone(), session.clone())
            .is_some()
        {
            Err(SessionStoreError::AlreadyExists(
                sessions.get_key_value(&session.id).unwrap().0.clone(),
            ))
        } else {
            Ok(())
        }
    }

    async fn get_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn add_session_entry(
        &self,
        session_id: &SessionId,
        entry: SessionEntry,
    ) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.add_entry(entry);
            session.updated_at = Utc::now(); // Ensure updated_at is current
            Ok(())
        } else {
            Err(SessionStoreError::NotFound(session_id.clone()))
        }
    }

    async fn update_session(&self, session: &Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.id) {
            sessions.insert(session.id.clone(), session.clone());
            Ok(())
        } else {
            Err(SessionStoreError::NotFound(session.id.clone()))
        }
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(session_id).is_some() {
            Ok(())
        } else {
            Err(SessionStoreError::NotFound(session_id.clone()))
        }
    }
    /// Searches for session entries matching a full-text query within a specific session.
    ///
    /// This is a plain case-insensitive substring scan, not FTS — adequate
    /// for the in-memory store's intended use (tests, short-lived CLI runs).
    async fn search_session_entries(
        &self,
        session_id: &SessionId,
        query: &str,
    ) -> Result<Vec<(DateTime<Utc>, SessionEntry)>, SessionStoreError> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionStoreError::NotFound(session_id.clone()))?;
        let needle = query.to_lowercase();
        Ok(session
            .entries
            .iter()
            .filter(|(_, entry)| extract_searchable_content(entry).to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    /// Searches for session entries across all sessions matching a full-text query.
    async fn search_all_session_entries(
        &self,
        query: &str,
    ) -> Result<Vec<(SessionId, DateTime<Utc>, SessionEntry)>, SessionStoreError> {
        let sessions = self.sessions.lock().await;
        let needle = query.to_lowercase();
        Ok(sessions
            .values()
            .flat_map(|session| {
                session.entries.iter().filter_map(|(ts, entry)| {
                    extract_searchable_content(entry)
                        .to_lowercase()
                        .contains(&needle)
                        .then(|| (session.id.clone(), *ts, entry.clone()))
                })
            })
            .collect())
    }
}

fn extract_searchable_content(entry: &SessionEntry) -> String {
    match entry {
        SessionEntry::Message(msg) => msg.content.clone(),
        SessionEntry::ToolCallAttempt(tool_call) => format!(
            "tool_call: {} args: {}",
            tool_call.function.name, tool_call.function.arguments
        ),
        SessionEntry::LLMFailure(op_type, error_msg) => {
            format!("LLM_FAILURE: {} {}", op_type, error_msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::session::Session;

    #[tokio::test]
    async fn search_finds_matching_message_text() {
        let store = InMemorySessionStore::new();
        let session = Session::new();
        let id = session.id.clone();
        store.create_session(session).await.unwrap();
        store
            .add_session_entry(
                &id,
                SessionEntry::Message(
                    ChatMessage::user().content("find the needle please").build(),
                ),
            )
            .await
            .unwrap();

        let hits = store.search_session_entries(&id, "needle").await.unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store.search_session_entries(&id, "haystack").await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn create_session_twice_conflicts() {
        let store = InMemorySessionStore::new();
        let session = Session::new();
        store.create_session(session.clone()).await.unwrap();
        let err = store.create_session(session).await.unwrap_err();
        assert!(matches!(err, SessionStoreError::AlreadyExists(_)));
    }
}
