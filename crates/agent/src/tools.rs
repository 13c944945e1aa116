//! Tool execution middleware: turns an approval decision and a tool call
//! into the wire-format result text fed back to the LM, isolating the
//! "how do we call it and how do we report rejection/failure" concerns
//! from the streaming loop in [`crate::runner`].

use threadline_core::ToolCall;

use crate::approval::REJECTED_BY_USER;
use crate::mcp_manager::McpClientManager;

/// The outcome of attempting to execute one tool call, already rendered
/// as the JSON text that goes back to the LM as a tool result message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolExecutionResult {
    fn ok(text: String) -> Self {
        Self {
            text,
            is_error: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            text: format!("{{\"error\":true,\"message\":{:?}}}", message.into()),
            is_error: true,
        }
    }
}

/// Executes `call` against `mcp`'s tool catalog. Caller is responsible
/// for having already cleared the call with the `ApprovalGate` — this
/// function only knows how to run an approved call.
pub async fn execute(mcp: &McpClientManager, call: &ToolCall) -> ToolExecutionResult {
    let Some(tool) = mcp.tool(&call.function.name) else {
        return ToolExecutionResult::error(format!("unknown tool {}", call.function.name));
    };
    let args: serde_json::Value = serde_json::from_str(&call.function.arguments).unwrap_or_default();
    match tool.call(args).await {
        Ok(text) => ToolExecutionResult::ok(text),
        Err(e) => ToolExecutionResult::error(e.to_string()),
    }
}

/// The synthetic result fed back to the LM when the user rejects a tool
/// call via the approval gate.
pub fn rejected() -> ToolExecutionResult {
    ToolExecutionResult::error(REJECTED_BY_USER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_result_carries_the_sentinel_message() {
        let result = rejected();
        assert!(result.is_error);
        assert!(result.text.contains(REJECTED_BY_USER));
    }

    #[test]
    fn error_result_embeds_message_as_json_string() {
        let result = ToolExecutionResult::error("boom");
        assert!(result.text.contains("\"boom\""));
        assert!(result.is_error);
    }
}
