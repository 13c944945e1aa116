//! Pure `(state, action) -> state` reducers, one per slice. None of
//! these ever mutate the `Arc` they are given: an unhandled action
//! returns the same `Arc` (cheap clone, pointer-identical — see
//! `selectors::Selector`), a handled one builds a new value and wraps it
//! in a fresh `Arc`.

use std::sync::Arc;

use crate::actions::Action;
use crate::slices::{
    ApprovalState, ConnectionState, MessagesState, PendingApproval, SpaceState, StreamingContent,
    StreamingState, TopicsState,
};

pub fn topics(state: &Arc<TopicsState>, action: &Action) -> Arc<TopicsState> {
    match action {
        Action::TopicUpserted(meta) => {
            let mut topics = state.topics.clone();
            topics.insert(meta.topic_id.clone(), meta.clone());
            Arc::new(TopicsState { topics })
        }
        Action::TopicRemoved { topic_id } => {
            if !state.topics.contains_key(topic_id) {
                return state.clone();
            }
            let mut topics = state.topics.clone();
            topics.remove(topic_id);
            Arc::new(TopicsState { topics })
        }
        _ => state.clone(),
    }
}

pub fn messages(state: &Arc<MessagesState>, action: &Action) -> Arc<MessagesState> {
    match action {
        Action::MessagesLoaded { topic_id, messages } => {
            let mut by_topic = state.by_topic.clone();
            let mut loaded = state.loaded.clone();
            by_topic.insert(topic_id.clone(), messages.clone());
            loaded.insert(topic_id.clone());
            Arc::new(MessagesState {
                by_topic,
                loaded,
                finalized_ids: state.finalized_ids.clone(),
            })
        }
        Action::StreamingFinalized {
            topic_id,
            message_id,
            message,
        } => {
            let already_seen = state
                .finalized_ids
                .get(topic_id)
                .is_some_and(|ids| ids.contains(message_id));
            if already_seen {
                return state.clone();
            }
            let mut by_topic = state.by_topic.clone();
            by_topic.entry(topic_id.clone()).or_default().push(message.clone());
            let mut finalized_ids = state.finalized_ids.clone();
            finalized_ids
                .entry(topic_id.clone())
                .or_default()
                .insert(message_id.clone());
            Arc::new(MessagesState {
                by_topic,
                loaded: state.loaded.clone(),
                finalized_ids,
            })
        }
        Action::TopicRemoved { topic_id } => {
            if !state.by_topic.contains_key(topic_id)
                && !state.loaded.contains(topic_id)
                && !state.finalized_ids.contains_key(topic_id)
            {
                return state.clone();
            }
            let mut by_topic = state.by_topic.clone();
            let mut loaded = state.loaded.clone();
            let mut finalized_ids = state.finalized_ids.clone();
            by_topic.remove(topic_id);
            loaded.remove(topic_id);
            finalized_ids.remove(topic_id);
            Arc::new(MessagesState {
                by_topic,
                loaded,
                finalized_ids,
            })
        }
        _ => state.clone(),
    }
}

pub fn streaming(state: &Arc<StreamingState>, action: &Action) -> Arc<StreamingState> {
    match action {
        Action::StreamingStarted { topic_id, message_id } => {
            let mut content = state.content.clone();
            let mut streaming = state.streaming.clone();
            content.insert(
                topic_id.clone(),
                StreamingContent {
                    message_id: message_id.clone(),
                    text: String::new(),
                },
            );
            streaming.insert(topic_id.clone());
            Arc::new(StreamingState {
                content,
                streaming,
                resuming: state.resuming.clone(),
            })
        }
        Action::StreamingDelta {
            topic_id,
            message_id,
            text,
        } => {
            let mut content = state.content.clone();
            let entry = content.entry(topic_id.clone()).or_insert_with(|| StreamingContent {
                message_id: message_id.clone(),
                text: String::new(),
            });
            if &entry.message_id != message_id {
                // A delta for a superseded stream id; ignore.
                return state.clone();
            }
            entry.text.push_str(text);
            Arc::new(StreamingState {
                content,
                streaming: state.streaming.clone(),
                resuming: state.resuming.clone(),
            })
        }
        Action::StreamingFinalized {
            topic_id,
            message_id,
            ..
        } => {
            let still_current = state
                .content
                .get(topic_id)
                .is_some_and(|c| &c.message_id == message_id);
            if !still_current {
                return state.clone();
            }
            let mut content = state.content.clone();
            let mut streaming = state.streaming.clone();
            let mut resuming = state.resuming.clone();
            content.remove(topic_id);
            streaming.remove(topic_id);
            resuming.remove(topic_id);
            Arc::new(StreamingState {
                content,
                streaming,
                resuming,
            })
        }
        Action::StreamingResumed { topic_id } => {
            if state.resuming.contains(topic_id) {
                return state.clone();
            }
            let mut resuming = state.resuming.clone();
            resuming.insert(topic_id.clone());
            Arc::new(StreamingState {
                content: state.content.clone(),
                streaming: state.streaming.clone(),
                resuming,
            })
        }
        Action::TopicRemoved { topic_id } => {
            if !state.content.contains_key(topic_id)
                && !state.streaming.contains(topic_id)
                && !state.resuming.contains(topic_id)
            {
                return state.clone();
            }
            let mut content = state.content.clone();
            let mut streaming = state.streaming.clone();
            let mut resuming = state.resuming.clone();
            content.remove(topic_id);
            streaming.remove(topic_id);
            resuming.remove(topic_id);
            Arc::new(StreamingState {
                content,
                streaming,
                resuming,
            })
        }
        _ => state.clone(),
    }
}

pub fn connection(state: &Arc<ConnectionState>, action: &Action) -> Arc<ConnectionState> {
    match action {
        Action::ConnectionStatusChanged(status) => {
            if state.status == *status {
                return state.clone();
            }
            let ever_connected =
                state.ever_connected || *status == crate::slices::ConnectionStatus::Connected;
            Arc::new(ConnectionState {
                status: *status,
                ever_connected,
            })
        }
        _ => state.clone(),
    }
}

pub fn approval(state: &Arc<ApprovalState>, action: &Action) -> Arc<ApprovalState> {
    match action {
        Action::ApprovalRequested { topic_id, request } => {
            let mut pending = state.pending.clone();
            pending.insert(
                request.approval_id.clone(),
                PendingApproval {
                    topic_id: topic_id.clone(),
                    request: request.clone(),
                },
            );
            Arc::new(ApprovalState { pending })
        }
        Action::ApprovalResolved { approval_id } => {
            if !state.pending.contains_key(approval_id) {
                return state.clone();
            }
            let mut pending = state.pending.clone();
            pending.remove(approval_id);
            Arc::new(ApprovalState { pending })
        }
        Action::TopicRemoved { topic_id } => {
            let has_any = state.pending.values().any(|p| &p.topic_id == topic_id);
            if !has_any {
                return state.clone();
            }
            let pending = state
                .pending
                .iter()
                .filter(|(_, p)| &p.topic_id != topic_id)
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect();
            Arc::new(ApprovalState { pending })
        }
        _ => state.clone(),
    }
}

pub fn space(state: &Arc<SpaceState>, action: &Action) -> Arc<SpaceState> {
    match action {
        Action::TopicSelected { topic_id } => {
            if state.active_topic.as_deref() == Some(topic_id.as_str()) {
                return state.clone();
            }
            Arc::new(SpaceState {
                active_topic: Some(topic_id.clone()),
            })
        }
        Action::TopicRemoved { topic_id } => {
            if state.active_topic.as_deref() != Some(topic_id.as_str()) {
                return state.clone();
            }
            Arc::new(SpaceState { active_topic: None })
        }
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::chat::{ChatRole, MessageType};

    fn msg(text: &str) -> threadline_core::chat::ChatMessage {
        threadline_core::chat::ChatMessage {
            role: ChatRole::Assistant,
            message_type: MessageType::default(),
            content: text.to_string(),
        }
    }

    #[test]
    fn unhandled_action_returns_the_same_arc() {
        let state = Arc::new(TopicsState::default());
        let next = topics(&state, &Action::ConnectionStatusChanged(crate::slices::ConnectionStatus::Connected));
        assert!(Arc::ptr_eq(&state, &next));
    }

    #[test]
    fn streaming_delta_accumulates_text() {
        let state = Arc::new(StreamingState::default());
        let s1 = streaming(
            &state,
            &Action::StreamingStarted {
                topic_id: "t1".into(),
                message_id: "m1".into(),
            },
        );
        let s2 = streaming(
            &s1,
            &Action::StreamingDelta {
                topic_id: "t1".into(),
                message_id: "m1".into(),
                text: "hel".into(),
            },
        );
        let s3 = streaming(
            &s2,
            &Action::StreamingDelta {
                topic_id: "t1".into(),
                message_id: "m1".into(),
                text: "lo".into(),
            },
        );
        assert_eq!(s3.content.get("t1").unwrap().text, "hello");
    }

    #[test]
    fn finalize_clears_streaming_and_appends_message_once() {
        let streaming_state = Arc::new(StreamingState::default());
        let s1 = streaming(
            &streaming_state,
            &Action::StreamingStarted {
                topic_id: "t1".into(),
                message_id: "m1".into(),
            },
        );
        let finalize = Action::StreamingFinalized {
            topic_id: "t1".into(),
            message_id: "m1".into(),
            message: msg("hello"),
        };
        let s2 = streaming(&s1, &finalize);
        assert!(!s2.content.contains_key("t1"));
        assert!(!s2.streaming.contains("t1"));

        let messages_state = Arc::new(MessagesState::default());
        let m1 = messages(&messages_state, &finalize);
        assert_eq!(m1.by_topic.get("t1").unwrap().len(), 1);
        // A duplicate finalize for the same message id is a no-op.
        let m2 = messages(&m1, &finalize);
        assert!(Arc::ptr_eq(&m1, &m2));
    }

    #[test]
    fn connection_tracks_ever_connected_across_drops() {
        let state = Arc::new(ConnectionState::default());
        let s1 = connection(
            &state,
            &Action::ConnectionStatusChanged(crate::slices::ConnectionStatus::Connected),
        );
        assert!(s1.ever_connected);
        let s2 = connection(
            &s1,
            &Action::ConnectionStatusChanged(crate::slices::ConnectionStatus::Disconnected),
        );
        assert!(s2.ever_connected);
    }
}
