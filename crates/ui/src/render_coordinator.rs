//! Throttles a stream of published `UIState` snapshots to at most one
//! render per 50 ms window: a burst of token deltas inside a window
//! collapses into the single most recent snapshot, a sample-and-hold
//! rather than a leading- or trailing-edge debounce.

use std::time::Duration;

use futures::Stream;
use tokio::sync::watch;

use crate::slices::UIState;

pub struct RenderCoordinator {
    interval_ms: u64,
}

impl RenderCoordinator {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms }
    }

    /// Wraps `rx` in a stream that ticks every `interval_ms` and yields
    /// the latest snapshot only if it changed since the last tick — a
    /// tick with no change yields nothing.
    pub fn throttle(&self, mut rx: watch::Receiver<UIState>) -> impl Stream<Item = UIState> {
        let interval_ms = self.interval_ms;
        async_stream::stream! {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if rx.has_changed().unwrap_or(false) {
                    yield rx.borrow_and_update().clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use tokio::sync::watch;

    #[tokio::test]
    async fn collapses_a_burst_into_one_render() {
        let (tx, rx) = watch::channel(UIState::default());
        let coordinator = RenderCoordinator::new(20);
        let stream = coordinator.throttle(rx);
        tokio::pin!(stream);

        for _ in 0..20 {
            let mut next = UIState::default();
            next.space = Arc::new(crate::slices::SpaceState {
                active_topic: Some("t1".into()),
            });
            tx.send(next).unwrap();
        }

        let snapshot = tokio::time::timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("a render should be produced within one window")
            .expect("stream should not end");
        assert_eq!(snapshot.space.active_topic.as_deref(), Some("t1"));
    }
}
