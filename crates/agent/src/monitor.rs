//! Conversation Monitor: the top-level pipeline. Pulls prompts from a
//! fan-in source, groups them by `ConversationKey`, and runs one agent at
//! a time per key while different keys proceed in parallel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use threadline_core::chat::ChatMessage;

use crate::error::AgentError;
use crate::history::ChatHistoryStore;
use crate::runner::AgentRunner;
use crate::session::SessionRegistry;
use crate::types::{ConversationKey, Prompt, ResponseUpdate};

/// Resolves the agent runner for a conversation key, lazily and on first
/// use — "first prompt wins; subsequent prompts to the same key reuse
/// it" is the caller's responsibility (the Monitor calls this at most
/// once per key, via its own caching, if the factory itself is cheap to
/// call repeatedly it may also cache internally).
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self, key: &ConversationKey) -> Result<Arc<dyn AgentRunner>, AgentError>;
}

pub struct ConversationMonitor {
    sessions: Arc<SessionRegistry>,
    history: Arc<ChatHistoryStore>,
    factory: Arc<dyn AgentFactory>,
    runners: Mutex<HashMap<ConversationKey, Arc<dyn AgentRunner>>>,
    queues: Mutex<HashMap<ConversationKey, VecDeque<Prompt>>>,
    processing: Mutex<HashSet<ConversationKey>>,
}

impl ConversationMonitor {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        history: Arc<ChatHistoryStore>,
        factory: Arc<dyn AgentFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            history,
            factory,
            runners: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            processing: Mutex::new(HashSet::new()),
        })
    }

    /// Consumes `prompts` until `cancel` fires. Each prompt is routed to
    /// its key's queue; a key with an in-flight run is left queued, not
    /// reprocessed, until the current run completes.
    pub async fn run(
        self: Arc<Self>,
        mut prompts: Pin<Box<dyn Stream<Item = Prompt> + Send>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = prompts.next() => {
                    match next {
                        Some(prompt) => self.ingest(prompt).await,
                        None => return,
                    }
                }
            }
        }
    }

    /// Queues one prompt for its conversation key, spawning the drain
    /// task if this key has no run currently in flight.
    pub async fn ingest(self: &Arc<Self>, prompt: Prompt) {
        let key = prompt.key.clone();
        let should_spawn = {
            self.queues.lock().entry(key.clone()).or_default().push_back(prompt);
            let mut processing = self.processing.lock();
            if processing.contains(&key) {
                false
            } else {
                processing.insert(key.clone());
                true
            }
        };
        if should_spawn {
            let this = self.clone();
            tokio::spawn(async move { this.drain(key).await });
        }
    }

    async fn drain(self: Arc<Self>, key: ConversationKey) {
        loop {
            let next = {
                let mut queues = self.queues.lock();
                queues.get_mut(&key).and_then(VecDeque::pop_front)
            };
            let Some(prompt) = next else {
                self.processing.lock().remove(&key);
                return;
            };
            if let Err(e) = self.run_one(prompt).await {
                log::error!("conversation run for {key:?} failed: {e}");
            }
        }
    }

    async fn resolve_runner(&self, key: &ConversationKey) -> Result<Arc<dyn AgentRunner>, AgentError> {
        if let Some(runner) = self.runners.lock().get(key).cloned() {
            return Ok(runner);
        }
        let runner = self.factory.build(key).await?;
        self.runners.lock().entry(key.clone()).or_insert_with(|| runner.clone());
        Ok(runner)
    }

    /// Runs one prompt to completion: loads history, appends the user
    /// turn, drives the agent runner, and persists terminal records as
    /// they arrive. Returns only after the run has reached a terminal
    /// update (or failed outright), preserving the one-run-at-a-time
    /// invariant for this key.
    async fn run_one(&self, prompt: Prompt) -> Result<(), AgentError> {
        let session = self.sessions.get_or_create(&prompt.key);
        let mut messages = self
            .history
            .load(&prompt.key)
            .await
            .map_err(|e| AgentError::Other(e.into()))?;

        let user_message = ChatMessage::user().content(prompt.text.clone()).build();
        if let Err(e) = self.history.append_message(&prompt.key, user_message.clone()).await {
            log::warn!("failed to persist user message for {:?}: {e}", prompt.key);
        }
        messages.push(user_message);

        let runner = self.resolve_runner(&prompt.key).await?;
        session.start_run(runner, messages)?;

        let mut sub = session.subscribe();
        let mut assistant_text = String::new();
        while let Some(update) = sub.recv().await {
            match &update {
                ResponseUpdate::TextDelta { text } => assistant_text.push_str(text),
                ResponseUpdate::ToolCallDelta { call } => {
                    if let Err(e) = self.history.append_tool_call(&prompt.key, call.clone()).await {
                        log::warn!("failed to persist tool call for {:?}: {e}", prompt.key);
                    }
                }
                ResponseUpdate::Error { message } => {
                    if let Err(e) = self.history.append_failure(&prompt.key, "chat", message.clone()).await {
                        log::warn!("failed to persist failure for {:?}: {e}", prompt.key);
                    }
                }
                _ => {}
            }
            if update.is_terminal() {
                break;
            }
        }

        if !assistant_text.is_empty() {
            if let Err(e) = self
                .history
                .append_message(&prompt.key, ChatMessage::assistant().content(assistant_text).build())
                .await
            {
                log::warn!("failed to persist assistant message for {:?}: {e}", prompt.key);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalRegistry;
    use crate::history::ChatHistoryStore;
    use chrono::Utc;
    use threadline_core::session::InMemorySessionStore;

    struct EchoRunner;

    #[async_trait]
    impl AgentRunner for EchoRunner {
        async fn run_streaming(
            &self,
            history: Vec<ChatMessage>,
        ) -> Pin<Box<dyn futures::Stream<Item = ResponseUpdate> + Send>> {
            let last = history.last().map(|m| m.content.clone()).unwrap_or_default();
            Box::pin(futures::stream::iter(vec![
                ResponseUpdate::TextDelta { text: format!("echo: {last}") },
                ResponseUpdate::StreamComplete { cancelled: false },
            ]))
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl AgentFactory for EchoFactory {
        async fn build(&self, _key: &ConversationKey) -> Result<Arc<dyn AgentRunner>, AgentError> {
            Ok(Arc::new(EchoRunner))
        }
    }

    fn monitor() -> Arc<ConversationMonitor> {
        let sessions = Arc::new(SessionRegistry::new(Arc::new(ApprovalRegistry::new(vec![]))));
        let history = Arc::new(ChatHistoryStore::new(Arc::new(InMemorySessionStore::new())));
        ConversationMonitor::new(sessions, history, Arc::new(EchoFactory))
    }

    #[tokio::test]
    async fn single_prompt_persists_user_and_assistant_turns() {
        let monitor = monitor();
        let key = ConversationKey::new(1, 1, "librarian");
        monitor
            .ingest(Prompt {
                prompt_id: "p1".into(),
                key: key.clone(),
                text: "hello".into(),
                sender_id: "u1".into(),
                source: "test".into(),
                received_at: Utc::now(),
            })
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let messages = monitor.history.load(&key).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].content, "echo: hello");
    }

    #[tokio::test]
    async fn queued_prompts_for_same_key_process_in_order() {
        let monitor = monitor();
        let key = ConversationKey::new(2, 2, "librarian");
        for text in ["first", "second"] {
            monitor
                .ingest(Prompt {
                    prompt_id: format!("p-{text}"),
                    key: key.clone(),
                    text: text.into(),
                    sender_id: "u1".into(),
                    source: "test".into(),
                    received_at: Utc::now(),
                })
                .await;
        }

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let messages = monitor.history.load(&key).await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[2].content, "second");
    }
}
