//! Resource Subscription Monitor: background loop polling tracked MCP
//! resource URIs, emitting `resources/updated` exactly once per
//! transition to a terminal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::mcp_manager::McpClientManager;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// The state of one tracked resource, as reported by `ResourceStateSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    InProgress,
    Terminal,
    Gone,
}

/// Queried once per tick for every tracked `(sessionId, uri)` pair. A
/// concrete adapter implements this against whatever backs the resource
/// (a download manager, a job queue, ...).
#[async_trait]
pub trait ResourceStateSource: Send + Sync {
    async fn state_of(&self, session_id: &str, uri: &str) -> ResourceState;
}

/// Notified exactly once per terminal transition, and once more (with
/// `list_changed = true`) if the resource disappeared entirely.
#[async_trait]
pub trait ResourceNotifier: Send + Sync {
    async fn notify_updated(&self, session_id: &str, uri: &str);
    async fn notify_list_changed(&self, session_id: &str, uri: &str);
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Tracked {
    session_id: String,
    uri: String,
}

/// `SubscribedResources: map<(sessionId, uri) -> {serverHandle, lastSeenState}>`.
///
/// Only concrete URIs are tracked here: the narrow position taken is that
/// a session subscribed to a concrete URI is notified only via that
/// concrete path, never by template fan-out.
pub struct ResourceSubscriptionMonitor {
    tracked: Mutex<HashMap<Tracked, ResourceState>>,
}

impl ResourceSubscriptionMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tracked: Mutex::new(HashMap::new()),
        })
    }

    /// Begins tracking a concrete resource URI for a session.
    pub fn subscribe(&self, session_id: impl Into<String>, uri: impl Into<String>) {
        let key = Tracked {
            session_id: session_id.into(),
            uri: uri.into(),
        };
        self.tracked.lock().entry(key).or_insert(ResourceState::InProgress);
    }

    pub fn unsubscribe(&self, session_id: &str, uri: &str) {
        self.tracked.lock().remove(&Tracked {
            session_id: session_id.to_string(),
            uri: uri.to_string(),
        });
    }

    /// Runs the ~5s polling loop until `cancel` fires. Each tick looks up
    /// current state for every tracked subscription; a non-terminal
    /// resource is left alone, a resource that just went terminal is
    /// notified once and dropped from the tracking set, and a resource
    /// that has disappeared emits both notifications.
    pub async fn run(
        self: Arc<Self>,
        source: Arc<dyn ResourceStateSource>,
        notifier: Arc<dyn ResourceNotifier>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => self.tick(&*source, &*notifier).await,
            }
        }
    }

    async fn tick(&self, source: &dyn ResourceStateSource, notifier: &dyn ResourceNotifier) {
        let snapshot: Vec<Tracked> = self.tracked.lock().keys().cloned().collect();
        for key in snapshot {
            let state = source.state_of(&key.session_id, &key.uri).await;
            let mut tracked = self.tracked.lock();
            let Some(last_seen) = tracked.get(&key).copied() else {
                continue;
            };
            match state {
                ResourceState::InProgress => {
                    tracked.insert(key.clone(), state);
                }
                ResourceState::Terminal if last_seen != ResourceState::Terminal => {
                    tracked.remove(&key);
                    drop(tracked);
                    notifier.notify_updated(&key.session_id, &key.uri).await;
                }
                ResourceState::Terminal => {
                    // already notified; nothing to do until removed or gone
                }
                ResourceState::Gone => {
                    tracked.remove(&key);
                    drop(tracked);
                    notifier.notify_updated(&key.session_id, &key.uri).await;
                    notifier.notify_list_changed(&key.session_id, &key.uri).await;
                }
            }
        }
    }
}

/// Polls a tracked resource's state by reading it from whichever
/// connected MCP server still answers the URI. A resource a server no
/// longer recognizes is `Gone`; otherwise its text content is expected to
/// carry a `status` field the way a long-running job resource (e.g.
/// `download://<id>/`) reports progress — `"in_progress"`/`"pending"`
/// keep the subscription alive, anything else is treated as terminal.
pub struct McpResourceStateSource {
    manager: Arc<McpClientManager>,
}

impl McpResourceStateSource {
    pub fn new(manager: Arc<McpClientManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ResourceStateSource for McpResourceStateSource {
    async fn state_of(&self, _session_id: &str, uri: &str) -> ResourceState {
        match self.manager.read_resource(uri).await {
            None => ResourceState::Gone,
            Some(result) => state_from_contents(&result),
        }
    }
}

fn state_from_contents(result: &rmcp::model::ReadResourceResult) -> ResourceState {
    for content in &result.contents {
        let Some(text) = content.as_text() else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&text.text) else {
            continue;
        };
        match value.get("status").and_then(|s| s.as_str()) {
            Some("in_progress") | Some("pending") => return ResourceState::InProgress,
            Some(_) => return ResourceState::Terminal,
            None => {}
        }
    }
    ResourceState::InProgress
}

/// Logs resource transitions. `notifications/resources/updated` delivery
/// to the browser client requires the core's MCP server role towards the
/// UI, which lives on a separate surface from this monitor; until that
/// surface exists, logging is the real (non-test) notifier.
pub struct LoggingResourceNotifier;

#[async_trait]
impl ResourceNotifier for LoggingResourceNotifier {
    async fn notify_updated(&self, session_id: &str, uri: &str) {
        log::info!("session={session_id} resource `{uri}` reached a terminal state");
    }

    async fn notify_list_changed(&self, session_id: &str, uri: &str) {
        log::info!("session={session_id} resource `{uri}` is gone; list changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        states: Mutex<Vec<ResourceState>>,
    }

    #[async_trait]
    impl ResourceStateSource for ScriptedSource {
        async fn state_of(&self, _session_id: &str, _uri: &str) -> ResourceState {
            let mut states = self.states.lock();
            if states.len() > 1 {
                states.remove(0)
            } else {
                states[0]
            }
        }
    }

    struct CountingNotifier {
        updated: AtomicUsize,
        list_changed: AtomicUsize,
    }

    #[async_trait]
    impl ResourceNotifier for CountingNotifier {
        async fn notify_updated(&self, _session_id: &str, _uri: &str) {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }
        async fn notify_list_changed(&self, _session_id: &str, _uri: &str) {
            self.list_changed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn terminal_transition_notifies_exactly_once() {
        let monitor = ResourceSubscriptionMonitor::new();
        monitor.subscribe("s1", "download://42/");

        let source = Arc::new(ScriptedSource {
            states: Mutex::new(vec![
                ResourceState::InProgress,
                ResourceState::InProgress,
                ResourceState::Terminal,
            ]),
        });
        let notifier = Arc::new(CountingNotifier {
            updated: AtomicUsize::new(0),
            list_changed: AtomicUsize::new(0),
        });

        monitor.tick(&*source, &*notifier).await;
        assert_eq!(notifier.updated.load(Ordering::SeqCst), 0);
        monitor.tick(&*source, &*notifier).await;
        assert_eq!(notifier.updated.load(Ordering::SeqCst), 0);
        monitor.tick(&*source, &*notifier).await;
        assert_eq!(notifier.updated.load(Ordering::SeqCst), 1);

        // subsequent ticks produce nothing further: the subscription was
        // removed from the tracking set once notified.
        monitor.tick(&*source, &*notifier).await;
        assert_eq!(notifier.updated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gone_resource_emits_both_notifications() {
        let monitor = ResourceSubscriptionMonitor::new();
        monitor.subscribe("s1", "download://7/");
        let source = Arc::new(ScriptedSource {
            states: Mutex::new(vec![ResourceState::Gone]),
        });
        let notifier = Arc::new(CountingNotifier {
            updated: AtomicUsize::new(0),
            list_changed: AtomicUsize::new(0),
        });

        monitor.tick(&*source, &*notifier).await;
        assert_eq!(notifier.updated.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.list_changed.load(Ordering::SeqCst), 1);
    }
}
