//! Message bus adapter surface: parses inbound prompts, dead-lettering
//! anything malformed, and retries outbound responses on transient
//! failure.
//!
//! Message-bus parsing in the source this was distilled from had two
//! variants: one defaulting an unrecognized `agentId` to a fallback agent,
//! one rejecting it against a configured whitelist. This implementation
//! takes the stricter whitelist semantics.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DeadLetterReason;
use crate::types::{ConversationKey, Prompt};

const SEND_ATTEMPTS: u32 = 3;
const SEND_BASE_DELAY: Duration = Duration::from_secs(2);

/// The wire shape of an inbound bus message: `{correlationId, agentId,
/// prompt, sender}`.
#[derive(Debug, Deserialize)]
struct RawInboundMessage {
    #[serde(rename = "correlationId")]
    correlation_id: Option<String>,
    #[serde(rename = "agentId")]
    agent_id: Option<String>,
    prompt: Option<String>,
    sender: Option<String>,
}

/// A successfully parsed inbound message, ready to become a `Prompt`.
#[derive(Debug, Clone)]
pub struct InboundBusMessage {
    pub correlation_id: String,
    pub agent_id: String,
    pub prompt: String,
    pub sender: String,
}

impl InboundBusMessage {
    /// Builds the `Prompt` this message represents for a given `(chatId,
    /// threadId)` pair — the bus surface has no notion of threads, so
    /// every bus conversation is `threadId = 0`.
    pub fn into_prompt(self, chat_id: i64, received_at: DateTime<Utc>) -> Prompt {
        Prompt {
            prompt_id: self.correlation_id,
            key: ConversationKey::new(chat_id, 0, self.agent_id),
            text: self.prompt,
            sender_id: self.sender,
            source: "bus".to_string(),
            received_at,
        }
    }
}

/// The wire shape of an outbound bus response: `{correlationId, agentId,
/// response, completedAt}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundBusMessage {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub response: String,
    #[serde(rename = "completedAt")]
    pub completed_at: DateTime<Utc>,
}

/// Parses a raw inbound bus payload, dead-lettering it on any structural
/// problem instead of returning a parse error up the stack.
///
/// `body` is assumed already UTF-8 decoded by the transport; a transport
/// that reads raw bytes should map its own I/O failure to
/// `DeadLetterReason::BodyReadError` before calling this.
pub fn parse_inbound(
    body: &str,
    valid_agent_ids: &HashSet<String>,
) -> Result<InboundBusMessage, DeadLetterReason> {
    let raw: RawInboundMessage = serde_json::from_str(body)
        .map_err(|e| DeadLetterReason::DeserializationError(e.to_string()))?;

    let correlation_id = raw
        .correlation_id
        .ok_or(DeadLetterReason::MissingField("correlationId"))?;
    let agent_id = raw.agent_id.ok_or(DeadLetterReason::MissingField("agentId"))?;
    let prompt = raw.prompt.ok_or(DeadLetterReason::MissingField("prompt"))?;
    let sender = raw.sender.ok_or(DeadLetterReason::MissingField("sender"))?;

    if !valid_agent_ids.contains(&agent_id) {
        return Err(DeadLetterReason::InvalidAgentId(agent_id));
    }

    Ok(InboundBusMessage {
        correlation_id,
        agent_id,
        prompt,
        sender,
    })
}

/// Transport-level send of one outbound response. Implementations should
/// return `Err` only for transient conditions worth retrying.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, message: &OutboundBusMessage) -> Result<(), anyhow::Error>;
}

/// Sends `message` via `sender`, retrying transient failures up to
/// `SEND_ATTEMPTS` times with doubling backoff from `SEND_BASE_DELAY`.
pub async fn send_with_retry(
    sender: &dyn OutboundSender,
    message: &OutboundBusMessage,
) -> Result<(), anyhow::Error> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match sender.send(message).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < SEND_ATTEMPTS => {
                let delay = SEND_BASE_DELAY * 2u32.pow(attempt - 1);
                log::warn!(
                    "outbound bus send attempt {attempt}/{SEND_ATTEMPTS} for correlation `{}` failed: {e}; retrying in {delay:?}",
                    message.correlation_id
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist() -> HashSet<String> {
        ["librarian".to_string()].into_iter().collect()
    }

    #[test]
    fn well_formed_message_parses() {
        let body = r#"{"correlationId":"c1","agentId":"librarian","prompt":"hi","sender":"u1"}"#;
        let parsed = parse_inbound(body, &whitelist()).unwrap();
        assert_eq!(parsed.agent_id, "librarian");
        assert_eq!(parsed.prompt, "hi");
    }

    #[test]
    fn unknown_agent_id_is_dead_lettered() {
        let body = r#"{"correlationId":"c1","agentId":"unknown","prompt":"hi","sender":"u1"}"#;
        let err = parse_inbound(body, &whitelist()).unwrap_err();
        assert_eq!(err, DeadLetterReason::InvalidAgentId("unknown".to_string()));
    }

    #[test]
    fn missing_field_is_dead_lettered() {
        let body = r#"{"correlationId":"c1","prompt":"hi","sender":"u1"}"#;
        let err = parse_inbound(body, &whitelist()).unwrap_err();
        assert_eq!(err, DeadLetterReason::MissingField("agentId"));
    }

    #[test]
    fn invalid_json_is_dead_lettered() {
        let body = "not json";
        let err = parse_inbound(body, &whitelist()).unwrap_err();
        assert!(matches!(err, DeadLetterReason::DeserializationError(_)));
    }

    struct FlakySender {
        fail_times: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl OutboundSender for FlakySender {
        async fn send(&self, _message: &OutboundBusMessage) -> Result<(), anyhow::Error> {
            use std::sync::atomic::Ordering;
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                anyhow::bail!("transient");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_with_retry_recovers_from_transient_failures() {
        let sender = FlakySender {
            fail_times: std::sync::atomic::AtomicU32::new(1),
        };
        let message = OutboundBusMessage {
            correlation_id: "c1".into(),
            agent_id: "librarian".into(),
            response: "done".into(),
            completed_at: Utc::now(),
        };
        send_with_retry(&sender, &message).await.unwrap();
    }
}
