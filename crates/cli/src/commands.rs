//! Conversational commands every adapter interprets the same way:
//! `/cancel`, `/clear`, `/help`. Concrete tool commands are out of scope.

use std::sync::Arc;

use threadline_agent::{ConversationKey, session::SessionRegistry};
use threadline_agent::history::ChatHistoryStore;
use threadline_agent::types::ApprovalResult;

pub const HELP_TEXT: &str = "\
Available commands:
  /cancel           stop the in-flight response for this conversation
  /clear            wipe this conversation's persisted history
  /approve <id>     approve a pending tool call
  /deny <id>        reject a pending tool call
  /help             show this message";

pub enum CommandOutcome {
    Handled(String),
    NotACommand,
}

/// Interprets `line` as a conversational command if it starts with `/`.
/// Returns `NotACommand` for anything else, leaving the caller to treat
/// it as a prompt.
pub async fn handle(
    line: &str,
    key: &ConversationKey,
    sessions: &Arc<SessionRegistry>,
    history: &Arc<ChatHistoryStore>,
) -> CommandOutcome {
    let Some(rest) = line.strip_prefix('/') else {
        return CommandOutcome::NotACommand;
    };
    let mut parts = rest.split_whitespace();
    let Some(cmd) = parts.next() else {
        return CommandOutcome::NotACommand;
    };

    match cmd {
        "help" => CommandOutcome::Handled(HELP_TEXT.to_string()),
        "cancel" => {
            if let Some(session) = sessions.get(key) {
                session.cancel();
                CommandOutcome::Handled("cancelled the in-flight run".to_string())
            } else {
                CommandOutcome::Handled("no active session to cancel".to_string())
            }
        }
        "clear" => {
            sessions.remove(key);
            match history.clear(key).await {
                Ok(()) => CommandOutcome::Handled("conversation history cleared".to_string()),
                Err(e) => CommandOutcome::Handled(format!("failed to clear history: {e}")),
            }
        }
        "approve" | "deny" => {
            let Some(approval_id) = parts.next() else {
                return CommandOutcome::Handled(format!("usage: /{cmd} <approval-id>"));
            };
            let Some(session) = sessions.get(key) else {
                return CommandOutcome::Handled("no active session awaiting approval".to_string());
            };
            let result = if cmd == "approve" {
                ApprovalResult::Approved
            } else {
                ApprovalResult::Rejected
            };
            match session.resolve_approval(approval_id, result) {
                Ok(()) => CommandOutcome::Handled(format!("{cmd}d {approval_id}")),
                Err(e) => CommandOutcome::Handled(format!("failed to resolve approval: {e}")),
            }
        }
        _ => CommandOutcome::Handled(format!("unknown command: /{cmd}. Type /help for a list.")),
    }
}
