//! The store: the single writer per slice. It registers itself with a
//! [`Dispatcher`] as one handler among possibly many — effects register
//! separately and see the same stream of actions, never the store's
//! internals.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::actions::Action;
use crate::dispatcher::Dispatcher;
use crate::reducers;
use crate::slices::UIState;

pub struct Store {
    state: Mutex<UIState>,
    publish: watch::Sender<UIState>,
}

impl Store {
    /// Builds a store and registers it with `dispatcher`. Returns the
    /// store and a receiver for observing every published snapshot
    /// (components normally go through a [`crate::Selector`] instead of
    /// watching this directly).
    pub fn new(dispatcher: &Dispatcher) -> (Arc<Self>, watch::Receiver<UIState>) {
        let initial = UIState::default();
        let (publish, subscribe) = watch::channel(initial.clone());
        let store = Arc::new(Self {
            state: Mutex::new(initial),
            publish,
        });
        let handler_store = store.clone();
        dispatcher.register(move |action| handler_store.apply(action));
        (store, subscribe)
    }

    pub fn snapshot(&self) -> UIState {
        self.state.lock().clone()
    }

    fn apply(&self, action: &Action) {
        let mut guard = self.state.lock();
        let next = UIState {
            topics: reducers::topics(&guard.topics, action),
            messages: reducers::messages(&guard.messages, action),
            streaming: reducers::streaming(&guard.streaming, action),
            connection: reducers::connection(&guard.connection, action),
            approval: reducers::approval(&guard.approval, action),
            space: reducers::space(&guard.space, action),
        };
        *guard = next.clone();
        drop(guard);
        // A lagging or closed receiver is not the store's problem.
        let _ = self.publish.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slices::ConnectionStatus;

    #[tokio::test]
    async fn dispatch_updates_only_the_touched_slice() {
        let dispatcher = Dispatcher::new();
        let (store, _rx) = Store::new(&dispatcher);
        let before = store.snapshot();

        dispatcher.dispatch(Action::ConnectionStatusChanged(ConnectionStatus::Connected));

        let after = store.snapshot();
        assert!(Arc::ptr_eq(&before.topics, &after.topics));
        assert!(Arc::ptr_eq(&before.messages, &after.messages));
        assert!(!Arc::ptr_eq(&before.connection, &after.connection));
        assert_eq!(after.connection.status, ConnectionStatus::Connected);
    }
}
