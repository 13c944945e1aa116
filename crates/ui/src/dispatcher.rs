//! Registration-based action dispatcher: any number of handlers —
//! stores, effects, test probes — register independently and all of
//! them see every dispatched action. Handlers are plain closures, not a
//! trait object hierarchy, matching the store's "cheap, composable
//! function" texture elsewhere in this crate.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::actions::Action;

type Handler = Arc<dyn Fn(&Action) + Send + Sync>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<Vec<Handler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Handlers run in registration order on every
    /// subsequent `dispatch` call; order among handlers is otherwise
    /// unspecified by the model (spec.md only requires that every
    /// registered handler sees every action).
    pub fn register(&self, handler: impl Fn(&Action) + Send + Sync + 'static) {
        self.handlers.lock().push(Arc::new(handler));
    }

    /// Runs every registered handler with `action`. Handlers are
    /// snapshotted out from under the registration lock before running,
    /// so a handler is free to call `dispatch` again (an effect
    /// dispatching a follow-up action) without deadlocking on it.
    pub fn dispatch(&self, action: Action) {
        let handlers = self.handlers.lock().clone();
        for handler in handlers.iter() {
            handler(&action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn every_registered_handler_sees_every_action() {
        let dispatcher = Dispatcher::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let (a1, b1) = (a.clone(), b.clone());
        dispatcher.register(move |_| {
            a1.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.register(move |_| {
            b1.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch(Action::TopicSelected {
            topic_id: "t1".into(),
        });
        dispatcher.dispatch(Action::TopicSelected {
            topic_id: "t2".into(),
        });
        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }
}
