//! Provider-agnostic chat, session and MCP primitives.
//!
//! This crate supplies the building blocks the orchestration layer in
//! `threadline-agent` is assembled from: a provider-agnostic chat message
//! model, a thin MCP client dialing/adaptation layer, and a pluggable
//! session history store. It has no opinion about concurrency, approval
//! flow or UI presentation — those live upstream.

/// Chat message types and the streaming `ChatProvider` trait.
pub mod chat;

/// Error types shared by the chat/session/MCP surfaces.
pub mod error;

/// MCP transport dialing and tool adaptation.
#[cfg(feature = "mcp")]
pub mod mcp;

/// Session history persistence (in-memory and SQLite).
pub mod session;

/// Host-side callable tool adapter trait.
pub mod tool_decorator;

pub use chat::{ChatMessage, ChatResponse, Tool};
pub use error::LLMError;

use serde::{Deserialize, Serialize};

/// A function call an LLM wants to make. Standardized across providers.
#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Deserialize, Serialize, Clone, Eq, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Token usage, tolerant of the field-name variance across providers.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Usage {
    #[serde(
        alias = "prompt_tokens",
        alias = "input_tokens",
        alias = "prompt_eval_count",
        alias = "promptTokenCount"
    )]
    pub input_tokens: u32,
    #[serde(
        alias = "completion_tokens",
        alias = "output_tokens",
        alias = "eval_count",
        alias = "candidatesTokenCount"
    )]
    pub output_tokens: u32,
}
