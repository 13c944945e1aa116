use serde::{Deserialize, Serialize};

use crate::types::ConversationKey;

/// Errors surfaced by the orchestration engine.
///
/// Mirrors the error handling table: most variants are recoverable at the
/// point where they're raised and never bubble past a single session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AgentError {
    // --- Session lifecycle ---
    #[error("no session for conversation key {0:?}")]
    SessionNotFound(ConversationKey),

    #[error("session for {0:?} is already processing a prompt")]
    SessionBusy(ConversationKey),

    // --- Tool approval ---
    #[error("approval {approval_id} does not match the pending request")]
    ApprovalMismatch { approval_id: String },

    #[error("no approval is currently pending for this conversation")]
    NoPendingApproval,

    // --- MCP / protocol ---
    #[error("failed to dial MCP server `{server}` after {attempts} attempts: {message}")]
    McpDialFailed {
        server: String,
        attempts: u32,
        message: String,
    },

    #[error("MCP transport for server `{server}` was lost mid-session")]
    McpTransportLost { server: String },

    #[error("duplicate tool name `{0}` after server qualification")]
    DuplicateToolName(String),

    // --- Bus / adapter surface ---
    #[error("dead-lettered inbound message: {0:?}")]
    DeadLetter(DeadLetterReason),

    // --- Provider / LLM ---
    #[error("language model provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Reasons an inbound bus message is dead-lettered instead of queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadLetterReason {
    MissingField(&'static str),
    DeserializationError(String),
    InvalidAgentId(String),
    BodyReadError(String),
}
