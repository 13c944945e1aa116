//! Side-effect workers: independent dispatcher subscribers that perform
//! I/O and dispatch further actions. None of these touch `Store` state
//! directly — reading it (via `Store::snapshot`) and writing it (via
//! `Dispatcher::dispatch`) are the only two moves available to an
//! effect, which is what invariant (b) requires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::actions::Action;
use crate::dispatcher::Dispatcher;
use crate::slices::ConnectionStatus;
use crate::store::Store;

/// Registers the reconnection effect: on every transition of
/// `Connection.status` to `Connected`, dispatches `HistoryReloadRequested`
/// for each topic the store currently knows about — except the very
/// first transition, since that is the ordinary first connection on
/// page load rather than a reconnect.
///
/// Performing the reload itself (re-fetching history over the wire,
/// resuming an in-flight stream) is the owning adapter's job; this
/// effect's contract ends at the dispatched action, the same boundary
/// `threadline-cli`'s `run_web` draws around the browser transport.
pub fn register_reconnection_effect(dispatcher: &Arc<Dispatcher>, store: Arc<Store>) {
    let dispatcher_handle = dispatcher.clone();
    let seen_first_connection = AtomicBool::new(false);
    dispatcher.register(move |action| {
        let Action::ConnectionStatusChanged(status) = action else {
            return;
        };
        if *status != ConnectionStatus::Connected {
            return;
        }
        if !seen_first_connection.swap(true, Ordering::SeqCst) {
            return;
        }
        let topic_ids: Vec<String> = store.snapshot().topics.topics.keys().cloned().collect();
        for topic_id in topic_ids {
            dispatcher_handle.dispatch(Action::HistoryReloadRequested { topic_id });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn topic(id: &str) -> threadline_agent::types::TopicMetadata {
        threadline_agent::types::TopicMetadata {
            topic_id: id.into(),
            name: "general".into(),
            agent_id: "librarian".into(),
            last_message_at: chrono::Utc::now(),
            last_read_count: 0,
        }
    }

    #[test]
    fn does_not_fire_on_the_first_connection() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (store, _rx) = Store::new(&dispatcher);
        let reloads = Arc::new(AtomicUsize::new(0));
        let reloads_clone = reloads.clone();
        dispatcher.register(move |action| {
            if matches!(action, Action::HistoryReloadRequested { .. }) {
                reloads_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        register_reconnection_effect(&dispatcher, store.clone());

        dispatcher.dispatch(Action::TopicUpserted(topic("t1")));
        dispatcher.dispatch(Action::ConnectionStatusChanged(ConnectionStatus::Connected));
        assert_eq!(reloads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fires_on_reconnection_after_a_drop() {
        let dispatcher = Arc::new(Dispatcher::new());
        let (store, _rx) = Store::new(&dispatcher);
        let reloads = Arc::new(AtomicUsize::new(0));
        let reloads_clone = reloads.clone();
        dispatcher.register(move |action| {
            if matches!(action, Action::HistoryReloadRequested { .. }) {
                reloads_clone.fetch_add(1, Ordering::SeqCst);
            }
        });
        register_reconnection_effect(&dispatcher, store.clone());

        dispatcher.dispatch(Action::TopicUpserted(topic("t1")));
        dispatcher.dispatch(Action::ConnectionStatusChanged(ConnectionStatus::Connected));
        dispatcher.dispatch(Action::ConnectionStatusChanged(ConnectionStatus::Disconnected));
        dispatcher.dispatch(Action::ConnectionStatusChanged(ConnectionStatus::Connected));

        assert_eq!(reloads.load(Ordering::SeqCst), 1);
        assert!(store.snapshot().connection.ever_connected);
    }
}
