//! Sampling handler: when an MCP tool server invokes the LM via MCP
//! sampling (`CreateMessage`), map its request onto the session's own
//! chat client and fold the streamed result back into a `CreateMessageResult`.

use std::sync::Arc;

use futures::StreamExt;
use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    ClientCapabilities, ClientInfo, CreateMessageRequestParam, CreateMessageResult, Implementation,
    ProtocolVersion, Role as McpRole, SamplingMessage,
};
use rmcp::service::RequestContext;
use rmcp::RoleClient;
use threadline_core::chat::{ChatMessage, ChatProvider, ChatRole, StreamChunk};
use threadline_core::error::LLMError;

/// Runs one sampling round-trip: maps `request` onto `provider`'s chat
/// client, aggregates the streamed text, and reports progress once per
/// delta via `on_progress`.
pub async fn handle_sampling_request(
    provider: &(dyn ChatProvider),
    request: CreateMessageRequestParam,
    mut on_progress: impl FnMut(&str),
) -> Result<CreateMessageResult, LLMError> {
    let messages: Vec<ChatMessage> = request
        .messages
        .iter()
        .map(sampling_message_to_chat_message)
        .collect();

    let mut aggregated = String::new();
    let mut finish_reason = "end_turn".to_string();

    if provider.supports_streaming() {
        let mut stream = provider.chat_stream(&messages).await?;
        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Text(delta) => {
                    aggregated.push_str(&delta);
                    on_progress(&delta);
                }
                StreamChunk::Done { stop_reason } => finish_reason = stop_reason,
                _ => {}
            }
        }
    } else {
        let response = provider.chat(&messages).await?;
        aggregated = response.text().unwrap_or_default();
        on_progress(&aggregated);
    }

    let _ = &request.model_preferences;
    Ok(CreateMessageResult {
        role: McpRole::Assistant,
        content: rmcp::model::Content::text(aggregated),
        model: "agent".to_string(),
        stop_reason: Some(finish_reason),
    })
}

fn sampling_message_to_chat_message(message: &SamplingMessage) -> ChatMessage {
    let role = match message.role {
        McpRole::User => ChatRole::User,
        McpRole::Assistant => ChatRole::Assistant,
    };
    let text = message.content.as_text().map(|t| t.text.clone()).unwrap_or_default();
    match role {
        ChatRole::User => ChatMessage::user().content(text).build(),
        ChatRole::Assistant => ChatMessage::assistant().content(text).build(),
    }
}

/// Shared, cancellable handle installed once per MCP client at manager
/// construction time so every server on the session routes sampling
/// through the same chat provider.
pub struct SamplingHandler {
    provider: Arc<dyn ChatProvider>,
}

impl SamplingHandler {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(
        &self,
        request: CreateMessageRequestParam,
        on_progress: impl FnMut(&str),
    ) -> Result<CreateMessageResult, LLMError> {
        handle_sampling_request(self.provider.as_ref(), request, on_progress).await
    }
}

/// The `ClientHandler` installed on every MCP client dialed by
/// `McpClientManager`: routes inbound `CreateMessage` (sampling) requests
/// to the session's chat provider via `SamplingHandler`. Mirrors
/// `McpClientHandler`'s role for elicitation — a single handler type
/// shared across every server connection for the session.
#[derive(Clone)]
pub struct SamplingClientHandler {
    sampling: Arc<SamplingHandler>,
    client_impl: Implementation,
}

impl SamplingClientHandler {
    pub fn new(sampling: Arc<SamplingHandler>, client_impl: Implementation) -> Self {
        Self {
            sampling,
            client_impl,
        }
    }
}

impl ClientHandler for SamplingClientHandler {
    #[allow(clippy::manual_async_fn)]
    fn create_message(
        &self,
        params: CreateMessageRequestParam,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateMessageResult, rmcp::ErrorData>> + Send + '_
    {
        async move {
            self.sampling
                .handle(params, |_delta| {})
                .await
                .map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))
        }
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ClientCapabilities::default(),
            client_info: self.client_impl.clone(),
        }
    }
}
