//! A dummy in-process `ChatProvider`: echoes the last user message back
//! word-by-word on a short delay, so the adapters below have something
//! real to stream without depending on an actual LM backend — wiring a
//! concrete provider is out of scope here (see `threadline_core::chat`
//! for the trait real providers implement).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use threadline_core::chat::{ChatMessage, ChatProvider, ChatResponse, ChatRole, FinishReason, StreamChunk};
use threadline_core::error::LLMError;

#[derive(Debug)]
struct EchoResponse {
    text: String,
}

impl std::fmt::Display for EchoResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl ChatResponse for EchoResponse {
    fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }
    fn tool_calls(&self) -> Option<Vec<threadline_core::ToolCall>> {
        None
    }
    fn finish_reason(&self) -> Option<FinishReason> {
        Some(FinishReason::Stop)
    }
    fn usage(&self) -> Option<threadline_core::Usage> {
        None
    }
}

pub struct EchoChatProvider;

fn reply_to(messages: &[ChatMessage]) -> String {
    let last_user = messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();
    format!("you said: {last_user}")
}

#[async_trait]
impl ChatProvider for EchoChatProvider {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[threadline_core::chat::Tool]>,
    ) -> Result<Box<dyn ChatResponse>, LLMError> {
        Ok(Box::new(EchoResponse {
            text: reply_to(messages),
        }))
    }

    async fn chat_stream_with_tools(
        &self,
        messages: &[ChatMessage],
        _tools: Option<&[threadline_core::chat::Tool]>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send>>, LLMError> {
        let words: Vec<String> = reply_to(messages).split(' ').map(str::to_string).collect();
        let chunks = stream::iter(words.into_iter().map(|w| Ok(StreamChunk::Text(format!("{w} ")))))
            .then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                chunk
            })
            .chain(stream::once(async {
                Ok(StreamChunk::Done {
                    stop_reason: "end_turn".to_string(),
                })
            }));
        Ok(Box::pin(chunks))
    }
}
