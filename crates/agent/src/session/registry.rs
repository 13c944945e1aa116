use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::approval::ApprovalRegistry;
use crate::types::ConversationKey;

use super::SessionManager;

/// Maps conversation keys to their live `SessionManager`. Equal keys share
/// one manager (and therefore one approval gate, one buffer, one set of
/// subscribers); distinct keys never interact.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConversationKey, Arc<SessionManager>>>,
    approvals: Arc<ApprovalRegistry>,
}

impl SessionRegistry {
    pub fn new(approvals: Arc<ApprovalRegistry>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            approvals,
        }
    }

    /// Returns the manager for `key`, creating one on first use.
    pub fn get_or_create(&self, key: &ConversationKey) -> Arc<SessionManager> {
        if let Some(existing) = self.sessions.lock().get(key).cloned() {
            return existing;
        }
        let gate = self.approvals.gate_for(&key.history_key());
        let manager = SessionManager::new(key.clone(), gate);
        self.sessions.lock().insert(key.clone(), manager.clone());
        manager
    }

    pub fn get(&self, key: &ConversationKey) -> Option<Arc<SessionManager>> {
        self.sessions.lock().get(key).cloned()
    }

    /// Drops a conversation's session state and its approval gate entirely
    /// — used when a `/clear` command wipes persisted history too.
    pub fn remove(&self, key: &ConversationKey) {
        self.sessions.lock().remove(key);
        self.approvals.remove(&key.history_key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_returns_same_manager() {
        let registry = SessionRegistry::new(Arc::new(ApprovalRegistry::new(vec![])));
        let key = ConversationKey::new(1, 2, "librarian");
        let a = registry.get_or_create(&key);
        let b = registry.get_or_create(&key);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_keys_get_distinct_managers() {
        let registry = SessionRegistry::new(Arc::new(ApprovalRegistry::new(vec![])));
        let a = registry.get_or_create(&ConversationKey::new(1, 1, "a"));
        let b = registry.get_or_create(&ConversationKey::new(1, 2, "a"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn remove_drops_both_session_and_approval_gate() {
        let registry = SessionRegistry::new(Arc::new(ApprovalRegistry::new(vec![])));
        let key = ConversationKey::new(5, 6, "x");
        registry.get_or_create(&key);
        assert!(registry.get(&key).is_some());
        registry.remove(&key);
        assert!(registry.get(&key).is_none());
    }
}
