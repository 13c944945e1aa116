//! Core data model shared across the orchestration engine: conversation
//! keys, prompts, streamed response updates, the merged tool catalog and
//! the tool approval handshake.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadline_core::ToolCall;

/// Groups prompts and replies: equal keys share one agent instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub chat_id: i64,
    pub thread_id: i64,
    pub agent_id: String,
}

impl ConversationKey {
    pub fn new(chat_id: i64, thread_id: i64, agent_id: impl Into<String>) -> Self {
        Self {
            chat_id,
            thread_id,
            agent_id: agent_id.into(),
        }
    }

    /// The key under which chat history for this conversation is persisted:
    /// `agent-key:<chatId>:<threadId>`.
    pub fn history_key(&self) -> String {
        format!("agent-key:{}:{}", self.chat_id, self.thread_id)
    }
}

/// A single inbound prompt, produced by an adapter and consumed exactly
/// once by the Conversation Monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub prompt_id: String,
    pub key: ConversationKey,
    pub text: String,
    pub sender_id: String,
    pub source: String,
    pub received_at: DateTime<Utc>,
}

/// A decision on a tool-approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalResult {
    Approved,
    ApprovedAndRemember,
    Rejected,
    AutoApproved,
}

/// Raised inside a tool invocation; resolved by the user (or the
/// approval cache/whitelist, auto-resolving to `AutoApproved`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub remember: bool,
}

/// A unit of streamed agent output. Produced by the agent runner and
/// multicast to every subscriber of a conversation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseUpdate {
    TextDelta { text: String },
    ReasoningDelta { text: String },
    ToolCallDelta { call: ToolCall },
    ApprovalRequest { request: ApprovalRequest },
    StreamComplete { cancelled: bool },
    Error { message: String },
}

impl ResponseUpdate {
    /// A terminal update is guaranteed to be the last one seen by every
    /// subscriber of a given run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseUpdate::StreamComplete { .. } | ResponseUpdate::Error { .. }
        )
    }
}

/// Describes one tool entry in the merged catalog, qualified by the
/// server it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub server: String,
    pub tool: threadline_core::chat::Tool,
}

/// Mapping from fully-qualified tool name (`server:tool`) to its
/// descriptor. Invariant: names are unique after qualification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCatalog {
    entries: HashMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a qualified tool. Returns an error (the name it collided
    /// on) if the fully-qualified name is already present.
    pub fn insert(&mut self, descriptor: ToolDescriptor) -> Result<(), String> {
        let name = format!("{}:{}", descriptor.server, descriptor.tool.function.name);
        if self.entries.contains_key(&name) {
            return Err(name);
        }
        self.entries.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, qualified_name: &str) -> Option<&ToolDescriptor> {
        self.entries.get(qualified_name)
    }

    pub fn tools(&self) -> Vec<threadline_core::chat::Tool> {
        self.entries.values().map(|d| d.tool.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The status of a per-conversation session's streaming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Processing,
    AwaitingApproval,
    Cancelled,
    Complete,
}

/// What the UI displays for a topic (browser-visible identifier that maps
/// deterministically to a `ConversationKey`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub topic_id: String,
    pub name: String,
    pub agent_id: String,
    pub last_message_at: DateTime<Utc>,
    pub last_read_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::chat::{FunctionTool, ParametersSchema, Tool};

    fn tool(name: &str) -> Tool {
        Tool {
            tool_type: "function".into(),
            function: FunctionTool {
                name: name.into(),
                description: String::new(),
                parameters: serde_json::json!({}),
            },
        }
    }

    #[test]
    fn history_key_matches_persisted_state_format() {
        let key = ConversationKey::new(1, 2, "librarian");
        assert_eq!(key.history_key(), "agent-key:1:2");
    }

    #[test]
    fn catalog_rejects_duplicate_qualified_names() {
        let mut catalog = ToolCatalog::new();
        catalog
            .insert(ToolDescriptor {
                server: "mcp-library".into(),
                tool: tool("search"),
            })
            .unwrap();
        let err = catalog
            .insert(ToolDescriptor {
                server: "mcp-library".into(),
                tool: tool("search"),
            })
            .unwrap_err();
        assert_eq!(err, "mcp-library:search");
    }

    #[test]
    fn stream_complete_and_error_are_terminal() {
        assert!(ResponseUpdate::StreamComplete { cancelled: false }.is_terminal());
        assert!(ResponseUpdate::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!ResponseUpdate::TextDelta { text: "hi".into() }.is_terminal());
    }
}
