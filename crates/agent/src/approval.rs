//! Tool Approval Gate: intercepts every tool invocation the LM requests,
//! decides whether to execute it, and forwards the decision back as the
//! tool's effective call or a rejection.

use std::collections::{HashMap, HashSet};

use glob::Pattern;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::AgentError;
use crate::types::{ApprovalRequest, ApprovalResult};

/// A synthetic tool result returned in place of execution when a call is
/// rejected by the user.
pub const REJECTED_BY_USER: &str = "rejected_by_user";

struct PendingApproval {
    approval_id: String,
    tool_name: String,
    resolver: oneshot::Sender<ApprovalResult>,
}

/// Per-conversation gate: caches approvals, matches whitelist globs, and
/// serializes at most one outstanding `ApprovalRequest` at a time.
pub struct ApprovalGate {
    /// Keyed by fully-qualified tool name; `true` once approved (and the
    /// caller asked to remember it).
    cache: Mutex<HashSet<String>>,
    whitelist: Vec<Pattern>,
    pending: Mutex<Option<PendingApproval>>,
}

/// Outcome of asking the gate to decide on a tool call.
pub enum GateDecision {
    /// Execute immediately — cached or whitelist-matched.
    AutoApproved,
    /// The caller must await `result` (resolved via `ApprovalGate::resolve`)
    /// before executing the call. `request` should be emitted to
    /// subscribers as a `ResponseUpdate::ApprovalRequest`.
    Awaiting {
        request: ApprovalRequest,
        result: oneshot::Receiver<ApprovalResult>,
    },
}

impl ApprovalGate {
    /// `whitelist` is a set of glob patterns of the form
    /// `mcp:<server>:<tool>`, matched against the fully-qualified tool name.
    pub fn new(whitelist: impl IntoIterator<Item = String>) -> Self {
        let whitelist = whitelist
            .into_iter()
            .filter_map(|pat| Pattern::new(&pat).ok())
            .collect();
        Self {
            cache: Mutex::new(HashSet::new()),
            whitelist,
            pending: Mutex::new(None),
        }
    }

    fn whitelisted(&self, qualified_tool_name: &str) -> bool {
        self.whitelist.iter().any(|p| p.matches(qualified_tool_name))
    }

    /// Decide what to do with a proposed tool call. Fails with
    /// `AgentError::SessionBusy`-shaped signalling only in spirit: per the
    /// spec, a second concurrent request cooperatively blocks rather than
    /// erroring, so callers should await the in-flight approval's result
    /// themselves before calling this again for a new request.
    pub fn decide(
        &self,
        qualified_tool_name: &str,
        arguments: serde_json::Value,
    ) -> GateDecision {
        if self.cache.lock().contains(qualified_tool_name) || self.whitelisted(qualified_tool_name) {
            return GateDecision::AutoApproved;
        }

        let (tx, rx) = oneshot::channel();
        let approval_id = Uuid::new_v4().to_string();
        let request = ApprovalRequest {
            approval_id: approval_id.clone(),
            tool_name: qualified_tool_name.to_string(),
            arguments,
            remember: false,
        };
        *self.pending.lock() = Some(PendingApproval {
            approval_id,
            tool_name: qualified_tool_name.to_string(),
            resolver: tx,
        });
        GateDecision::Awaiting {
            request,
            result: rx,
        }
    }

    /// Resolve the currently pending approval. Fails if none is pending,
    /// or if `approval_id` doesn't match the pending request's id — a
    /// stale or mistargeted resolution leaves the real pending approval
    /// untouched rather than consuming it. Duplicate resolutions for an
    /// already-settled id are simply ignored by virtue of the oneshot
    /// channel already being consumed.
    pub fn resolve(&self, approval_id: &str, result: ApprovalResult) -> Result<(), AgentError> {
        let mut guard = self.pending.lock();
        let Some(pending) = guard.as_ref() else {
            return Err(AgentError::NoPendingApproval);
        };
        if pending.approval_id != approval_id {
            return Err(AgentError::ApprovalMismatch {
                approval_id: approval_id.to_string(),
            });
        }

        let pending = guard.take().expect("checked Some above");
        drop(guard);
        if matches!(result, ApprovalResult::ApprovedAndRemember) {
            self.cache.lock().insert(pending.tool_name.clone());
        }
        let _ = pending.resolver.send(result);
        Ok(())
    }

    /// `true` if a request is currently awaiting resolution.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Unblocks any pending approval with a synthetic rejection, used on
    /// session cancellation.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.pending.lock().take() {
            let _ = pending.resolver.send(ApprovalResult::Rejected);
        }
    }
}

/// Per-conversation-key registry of approval gates and their whitelists.
pub struct ApprovalRegistry {
    gates: Mutex<HashMap<String, std::sync::Arc<ApprovalGate>>>,
    default_whitelist: Vec<String>,
}

impl ApprovalRegistry {
    pub fn new(default_whitelist: Vec<String>) -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
            default_whitelist,
        }
    }

    pub fn gate_for(&self, conversation_history_key: &str) -> std::sync::Arc<ApprovalGate> {
        self.gates
            .lock()
            .entry(conversation_history_key.to_string())
            .or_insert_with(|| std::sync::Arc::new(ApprovalGate::new(self.default_whitelist.clone())))
            .clone()
    }

    pub fn remove(&self, conversation_history_key: &str) {
        self.gates.lock().remove(conversation_history_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_tool_is_auto_approved() {
        let gate = ApprovalGate::new(["mcp:mcp-library:*".to_string()]);
        let decision = gate.decide("mcp:mcp-library:FileSearch", serde_json::json!({}));
        assert!(matches!(decision, GateDecision::AutoApproved));
    }

    #[tokio::test]
    async fn unwhitelisted_tool_awaits_then_resolves() {
        let gate = ApprovalGate::new([]);
        let decision = gate.decide("mcp:mcp-library:FileSearch", serde_json::json!({}));
        let GateDecision::Awaiting { request, result } = decision else {
            panic!("expected Awaiting");
        };
        assert!(gate.has_pending());

        gate.resolve(&request.approval_id, ApprovalResult::Approved).unwrap();
        assert_eq!(result.await.unwrap(), ApprovalResult::Approved);
        assert!(!gate.has_pending());
    }

    #[test]
    fn remember_populates_cache_for_future_calls() {
        let gate = ApprovalGate::new([]);
        let decision = gate.decide("mcp:fs:Read", serde_json::json!({}));
        let GateDecision::Awaiting { request, .. } = decision else {
            panic!("expected Awaiting");
        };
        gate.resolve(&request.approval_id, ApprovalResult::ApprovedAndRemember)
            .unwrap();

        let second = gate.decide("mcp:fs:Read", serde_json::json!({}));
        assert!(matches!(second, GateDecision::AutoApproved));
    }

    #[test]
    fn resolve_without_pending_request_errors() {
        let gate = ApprovalGate::new([]);
        let err = gate.resolve("anything", ApprovalResult::Approved).unwrap_err();
        assert!(matches!(err, AgentError::NoPendingApproval));
    }

    #[tokio::test]
    async fn resolve_with_mismatched_id_leaves_the_pending_request_intact() {
        let gate = ApprovalGate::new([]);
        let GateDecision::Awaiting { request, result } =
            gate.decide("mcp:fs:Read", serde_json::json!({}))
        else {
            panic!("expected Awaiting");
        };

        let err = gate.resolve("not-the-right-id", ApprovalResult::Approved).unwrap_err();
        assert!(matches!(err, AgentError::ApprovalMismatch { approval_id } if approval_id == "not-the-right-id"));
        assert!(gate.has_pending());

        gate.resolve(&request.approval_id, ApprovalResult::Approved).unwrap();
        assert_eq!(result.await.unwrap(), ApprovalResult::Approved);
    }

    #[tokio::test]
    async fn cancel_pending_rejects_outstanding_approval() {
        let gate = ApprovalGate::new([]);
        let GateDecision::Awaiting { result, .. } = gate.decide("mcp:fs:Write", serde_json::json!({})) else {
            panic!("expected Awaiting");
        };
        gate.cancel_pending();
        assert_eq!(result.await.unwrap(), ApprovalResult::Rejected);
    }
}
