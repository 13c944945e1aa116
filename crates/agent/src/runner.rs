//! The agent runner abstraction: polymorphism over "the agent" by its
//! capability set rather than by base-class inheritance. A runner turns
//! one turn's chat history into a lazy sequence of `ResponseUpdate`s.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use threadline_core::chat::{ChatMessage, ChatProvider, StreamChunk};
use threadline_core::{FunctionCall, ToolCall};

use crate::approval::{ApprovalGate, GateDecision};
use crate::mcp_manager::McpClientManager;
use crate::tools;
use crate::types::{ApprovalResult, ResponseUpdate, ToolCatalog};

/// Upper bound on LM ⇄ tool round trips within one `run_streaming` call,
/// guarding against a misbehaving model that never stops requesting tools.
const MAX_TOOL_ROUNDS: u32 = 8;

pub type UpdateStream = Pin<Box<dyn Stream<Item = ResponseUpdate> + Send>>;

/// Capability abstraction for "the agent": something that can run one
/// streaming turn over a message history.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_streaming(&self, history: Vec<ChatMessage>) -> UpdateStream;
}

/// An agent with no tool access: the LM's output is passed straight
/// through as `TextDelta`/`ReasoningDelta` updates.
pub struct LocalLmRunner {
    provider: Arc<dyn ChatProvider>,
}

impl LocalLmRunner {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AgentRunner for LocalLmRunner {
    async fn run_streaming(&self, history: Vec<ChatMessage>) -> UpdateStream {
        let provider = self.provider.clone();
        Box::pin(async_stream::stream! {
            match provider.chat_stream(&history).await {
                Ok(mut chunks) => {
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(StreamChunk::Text(text)) => yield ResponseUpdate::TextDelta { text },
                            Ok(StreamChunk::Done { .. }) => {
                                yield ResponseUpdate::StreamComplete { cancelled: false };
                                return;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                yield ResponseUpdate::Error { message: e.to_string() };
                                return;
                            }
                        }
                    }
                    yield ResponseUpdate::StreamComplete { cancelled: false };
                }
                Err(e) => yield ResponseUpdate::Error { message: e.to_string() },
            }
        })
    }
}

/// An agent backed by one or more MCP tool servers. Tool calls requested
/// by the LM are routed through the `ApprovalGate` before execution; the
/// tool's result is fed back into the LM as a follow-up turn.
pub struct McpAgentRunner {
    provider: Arc<dyn ChatProvider>,
    mcp: Arc<McpClientManager>,
    approval: Arc<ApprovalGate>,
}

impl McpAgentRunner {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        mcp: Arc<McpClientManager>,
        approval: Arc<ApprovalGate>,
    ) -> Self {
        Self {
            provider,
            mcp,
            approval,
        }
    }

    fn catalog(&self) -> ToolCatalog {
        self.mcp.tool_catalog().clone()
    }
}

#[async_trait]
impl AgentRunner for McpAgentRunner {
    async fn run_streaming(&self, history: Vec<ChatMessage>) -> UpdateStream {
        let provider = self.provider.clone();
        let mcp = self.mcp.clone();
        let approval = self.approval.clone();
        let tools = self.catalog().tools();

        Box::pin(async_stream::stream! {
            let mut messages = history;

            for _round in 0..MAX_TOOL_ROUNDS {
                let mut chunks = match provider.chat_stream_with_tools(&messages, Some(&tools)).await {
                    Ok(s) => s,
                    Err(e) => {
                        yield ResponseUpdate::Error { message: e.to_string() };
                        return;
                    }
                };

                let mut pending_call: Option<ToolCall> = None;
                let mut stopped = false;
                let mut stop_reason = "end_turn".to_string();

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(StreamChunk::Text(text)) => yield ResponseUpdate::TextDelta { text },
                        Ok(StreamChunk::ToolUseComplete { tool_call, .. }) => {
                            pending_call = Some(tool_call);
                        }
                        Ok(StreamChunk::Done { stop_reason: reason }) => {
                            stopped = true;
                            stop_reason = reason;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            yield ResponseUpdate::Error { message: e.to_string() };
                            return;
                        }
                    }
                }

                let Some(call) = pending_call else {
                    yield ResponseUpdate::StreamComplete { cancelled: false };
                    return;
                };
                let _ = stopped;
                let _ = stop_reason;

                let decision = approval.decide(&call.function.name, serde_json::from_str(&call.function.arguments).unwrap_or_default());
                let approved = match decision {
                    GateDecision::AutoApproved => true,
                    GateDecision::Awaiting { request, result } => {
                        yield ResponseUpdate::ApprovalRequest { request };
                        matches!(result.await, Ok(ApprovalResult::Approved | ApprovalResult::ApprovedAndRemember))
                    }
                };

                let result = if approved {
                    tools::execute(&mcp, &call).await
                } else {
                    tools::rejected()
                };

                yield ResponseUpdate::ToolCallDelta { call: call.clone() };

                messages.push(ChatMessage::assistant().tool_use(vec![call.clone()]).build());
                messages.push(
                    ChatMessage::user()
                        .content(result.text)
                        .tool_result(vec![ToolCall {
                            id: call.id.clone(),
                            call_type: call.call_type.clone(),
                            function: FunctionCall {
                                name: call.function.name.clone(),
                                arguments: call.function.arguments.clone(),
                            },
                        }])
                        .build(),
                );
            }

            yield ResponseUpdate::Error {
                message: "tool-call round limit reached".to_string(),
            };
        })
    }
}
