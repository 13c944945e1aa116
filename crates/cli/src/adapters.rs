//! The thin per-surface adapters: terminal REPL, message-bus stub, web
//! stub, and single-shot "once" mode. Each just turns its transport's
//! framing into `Prompt`s for the `ConversationMonitor` and renders the
//! `ResponseUpdate`s that come back — none of them know about LM
//! providers, MCP, or approval logic directly.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use colored::*;
use threadline_agent::history::ChatHistoryStore;
use threadline_agent::session::SessionRegistry;
use threadline_agent::types::ResponseUpdate;
use threadline_agent::{ConversationKey, ConversationMonitor, Prompt};

use crate::commands::{self, CommandOutcome};

/// Sends `text` as a prompt for `key` and prints updates as they arrive,
/// skipping the first `already_seen` updates (the previous turn's
/// replay, since this session's buffer is not cleared until its next
/// run starts). Returns the total update count observed so far.
async fn send_and_render(
    monitor: &Arc<ConversationMonitor>,
    sessions: &Arc<SessionRegistry>,
    key: &ConversationKey,
    text: String,
    already_seen: usize,
) -> usize {
    let session = sessions.get_or_create(key);
    let mut sub = session.subscribe();

    let prompt = Prompt {
        prompt_id: uuid::Uuid::new_v4().to_string(),
        key: key.clone(),
        text,
        sender_id: "cli".to_string(),
        source: "terminal".to_string(),
        received_at: Utc::now(),
    };
    monitor.clone().ingest(prompt).await;

    let mut seen = 0usize;
    print!("{} ", "assistant:".bright_green());
    std::io::stdout().flush().ok();
    while let Some(update) = sub.recv().await {
        let terminal = update.is_terminal();
        seen += 1;
        if seen > already_seen {
            render(&update);
        }
        if terminal {
            break;
        }
    }
    println!();
    seen
}

fn render(update: &ResponseUpdate) {
    match update {
        ResponseUpdate::TextDelta { text } => {
            print!("{text}");
            std::io::stdout().flush().ok();
        }
        ResponseUpdate::ReasoningDelta { .. } => {}
        ResponseUpdate::ToolCallDelta { call } => {
            print!("\n{} {}", "[tool]".bright_yellow(), call.function.name);
        }
        ResponseUpdate::ApprovalRequest { request } => {
            print!(
                "\n{} {} wants to call {} with {} — resolve with /approve {} or /deny {}",
                "[approval needed]".bright_magenta(),
                "agent".bright_cyan(),
                request.tool_name,
                request.arguments,
                request.approval_id,
                request.approval_id,
            );
        }
        ResponseUpdate::StreamComplete { cancelled } => {
            if *cancelled {
                print!("\n{}", "(cancelled)".bright_black());
            }
        }
        ResponseUpdate::Error { message } => {
            print!("\n{} {}", "error:".bright_red(), message);
        }
    }
}

/// Interactive REPL over stdin/stdout.
pub async fn run_terminal(
    monitor: Arc<ConversationMonitor>,
    sessions: Arc<SessionRegistry>,
    history: Arc<ChatHistoryStore>,
    key: ConversationKey,
) -> anyhow::Result<()> {
    println!("{}", "threadline — interactive session".bright_blue());
    println!("{}", "Type /help for commands, Ctrl-D to exit.".bright_black());

    let mut already_seen = 0usize;
    let stdin = std::io::stdin();
    loop {
        print!("{} ", "you:".bright_cyan());
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match commands::handle(line, &key, &sessions, &history).await {
            CommandOutcome::Handled(output) => {
                println!("{output}");
                if line.trim_start_matches('/') == "clear" {
                    already_seen = 0;
                }
            }
            CommandOutcome::NotACommand => {
                already_seen = send_and_render(&monitor, &sessions, &key, line.to_string(), already_seen).await;
            }
        }
    }
    Ok(())
}

/// One prompt, one response, then exit.
pub async fn run_once(
    monitor: Arc<ConversationMonitor>,
    sessions: Arc<SessionRegistry>,
    key: ConversationKey,
    prompt: String,
) -> anyhow::Result<()> {
    send_and_render(&monitor, &sessions, &key, prompt, 0).await;
    Ok(())
}

/// Reads newline-delimited bus JSON from stdin, parses each line via
/// `threadline_agent::bus::parse_inbound`, and prints the outbound
/// response shape to stdout. A real deployment would read/write an
/// actual message-bus transport; that plumbing is out of scope here.
pub async fn run_bot(
    monitor: Arc<ConversationMonitor>,
    sessions: Arc<SessionRegistry>,
    valid_agent_ids: std::collections::HashSet<String>,
    chat_id: i64,
) -> anyhow::Result<()> {
    use threadline_agent::bus::{parse_inbound, OutboundBusMessage};

    let stdin = std::io::stdin();
    let mut line = String::new();
    while stdin.read_line(&mut line)? > 0 {
        let body = line.trim().to_string();
        line.clear();
        if body.is_empty() {
            continue;
        }

        match parse_inbound(&body, &valid_agent_ids) {
            Ok(inbound) => {
                let correlation_id = inbound.correlation_id.clone();
                let agent_id = inbound.agent_id.clone();
                let key = ConversationKey::new(chat_id, 0, agent_id.clone());
                let prompt = inbound.into_prompt(chat_id, Utc::now());

                let session = sessions.get_or_create(&key);
                let mut sub = session.subscribe();
                monitor.clone().ingest(prompt).await;

                let mut response_text = String::new();
                while let Some(update) = sub.recv().await {
                    if let ResponseUpdate::TextDelta { text } = &update {
                        response_text.push_str(text);
                    }
                    if update.is_terminal() {
                        break;
                    }
                }

                let outbound = OutboundBusMessage {
                    correlation_id,
                    agent_id,
                    response: response_text,
                    completed_at: Utc::now(),
                };
                println!("{}", serde_json::to_string(&outbound)?);
            }
            Err(reason) => {
                log::warn!("dead-lettered inbound bus message: {reason:?}");
            }
        }
    }
    Ok(())
}

/// The browser push-connection hub is a separate adapter process; this
/// binary only validates the flag so `--chat web` fails fast rather than
/// silently behaving like `terminal`.
pub async fn run_web() -> anyhow::Result<()> {
    anyhow::bail!(
        "the `web` adapter is a standalone hub process linked against threadline-agent; \
         it is not exposed from this binary"
    )
}
