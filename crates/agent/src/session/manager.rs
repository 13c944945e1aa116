use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use threadline_core::chat::ChatMessage;

use crate::approval::ApprovalGate;
use crate::error::AgentError;
use crate::runner::AgentRunner;
use crate::types::{ApprovalResult, ConversationKey, ResponseUpdate, SessionStatus};

/// Capacity of the live-update broadcast channel. A subscriber that falls
/// further behind than this loses the oldest updates it hasn't yet read
/// (`broadcast::error::RecvError::Lagged`) rather than blocking the
/// publisher; the replay buffer is unaffected, so a fresh subscribe still
/// sees the complete run.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
struct Seq {
    seq: u64,
    update: ResponseUpdate,
}

struct Inner {
    buffer: Vec<Seq>,
    next_seq: u64,
    status: SessionStatus,
}

/// A snapshot of `SessionManager::stream_state`.
#[derive(Debug, Clone, Copy)]
pub struct StreamState {
    pub status: SessionStatus,
    pub has_pending_approval: bool,
    pub buffer_size_hint: usize,
}

/// Owns one conversation key's streaming pipeline: at most one run active
/// at a time, any number of subscribers observing it.
pub struct SessionManager {
    key: ConversationKey,
    inner: Mutex<Inner>,
    sender: broadcast::Sender<Seq>,
    approval: Arc<ApprovalGate>,
    run_cancel: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(key: ConversationKey, approval: Arc<ApprovalGate>) -> Arc<Self> {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Arc::new(Self {
            key,
            inner: Mutex::new(Inner {
                buffer: Vec::new(),
                next_seq: 0,
                status: SessionStatus::Idle,
            }),
            sender,
            approval,
            run_cancel: Mutex::new(None),
        })
    }

    /// Starts driving `runner` over `history`, discarding any prior run's
    /// buffer. Returns the new run's id immediately; updates arrive to
    /// subscribers as the runner produces them.
    pub fn start_run(
        self: &Arc<Self>,
        runner: Arc<dyn AgentRunner>,
        history: Vec<ChatMessage>,
    ) -> Result<String, AgentError> {
        {
            let inner = self.inner.lock();
            if matches!(
                inner.status,
                SessionStatus::Processing | SessionStatus::AwaitingApproval
            ) {
                return Err(AgentError::SessionBusy(self.key.clone()));
            }
        }

        let stream_id = Uuid::new_v4().to_string();
        {
            let mut inner = self.inner.lock();
            inner.buffer.clear();
            inner.next_seq = 0;
            inner.status = SessionStatus::Processing;
        }

        let cancel = CancellationToken::new();
        *self.run_cancel.lock() = Some(cancel.clone());

        let this = self.clone();
        tokio::spawn(async move {
            let mut updates = runner.run_streaming(history).await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        this.approval.cancel_pending();
                        this.push(ResponseUpdate::StreamComplete { cancelled: true });
                        break;
                    }
                    next = updates.next() => {
                        match next {
                            Some(update) => {
                                let terminal = update.is_terminal();
                                this.push(update);
                                if terminal {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(stream_id)
    }

    fn push(self: &Arc<Self>, update: ResponseUpdate) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.status = match &update {
            ResponseUpdate::ApprovalRequest { .. } => SessionStatus::AwaitingApproval,
            ResponseUpdate::StreamComplete { cancelled: true } => SessionStatus::Cancelled,
            ResponseUpdate::StreamComplete { cancelled: false } => SessionStatus::Complete,
            ResponseUpdate::Error { .. } => SessionStatus::Complete,
            _ => SessionStatus::Processing,
        };

        let entry = Seq { seq, update };
        inner.buffer.push(entry.clone());
        drop(inner);
        let _ = self.sender.send(entry);
    }

    /// Subscribes to this run: the returned `Subscription` first replays
    /// everything buffered so far, then forwards live updates, with no
    /// gap and no duplicate between the two.
    pub fn subscribe(&self) -> Subscription {
        // Snapshot the buffer and subscribe to live updates under the same
        // guard, so no update published concurrently with this call can be
        // missed (it would otherwise land strictly between the snapshot and
        // the subscribe call) or double-counted.
        let inner = self.inner.lock();
        let last_seq = inner.buffer.last().map(|s| s.seq);
        let replay: Vec<ResponseUpdate> = inner.buffer.iter().map(|s| s.update.clone()).collect();
        let receiver = self.sender.subscribe();
        drop(inner);

        Subscription {
            replay: replay.into(),
            receiver,
            last_seq,
        }
    }

    /// Requests cancellation of the active run, if any, and synthesizes a
    /// rejection for any approval it is currently awaiting.
    pub fn cancel(&self) {
        if let Some(cancel) = self.run_cancel.lock().take() {
            cancel.cancel();
        } else {
            self.approval.cancel_pending();
        }
    }

    pub fn resolve_approval(&self, approval_id: &str, result: ApprovalResult) -> Result<(), AgentError> {
        self.approval.resolve(approval_id, result)
    }

    pub fn stream_state(&self) -> StreamState {
        let inner = self.inner.lock();
        StreamState {
            status: inner.status,
            has_pending_approval: self.approval.has_pending(),
            buffer_size_hint: inner.buffer.len(),
        }
    }
}

/// A cursor over one run's updates: a prefix drawn from the replay buffer
/// followed by a suffix of live broadcast updates.
pub struct Subscription {
    replay: std::collections::VecDeque<ResponseUpdate>,
    receiver: broadcast::Receiver<Seq>,
    last_seq: Option<u64>,
}

impl Subscription {
    /// Returns the next update, or `None` once the run has completed and
    /// no further updates will ever arrive.
    pub async fn recv(&mut self) -> Option<ResponseUpdate> {
        if let Some(update) = self.replay.pop_front() {
            return Some(update);
        }
        loop {
            match self.receiver.recv().await {
                Ok(entry) => {
                    if Some(entry.seq) <= self.last_seq {
                        continue;
                    }
                    self.last_seq = Some(entry.seq);
                    return Some(entry.update);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::pin::Pin;

    struct ScriptedRunner;

    #[async_trait]
    impl AgentRunner for ScriptedRunner {
        async fn run_streaming(
            &self,
            _history: Vec<ChatMessage>,
        ) -> Pin<Box<dyn futures::Stream<Item = ResponseUpdate> + Send>> {
            Box::pin(futures::stream::iter(vec![
                ResponseUpdate::TextDelta { text: "hel".into() },
                ResponseUpdate::TextDelta { text: "lo".into() },
                ResponseUpdate::StreamComplete { cancelled: false },
            ]))
        }
    }

    #[tokio::test]
    async fn subscriber_sees_full_run_with_no_gap_or_duplicate() {
        let approval = Arc::new(ApprovalGate::new([]));
        let manager = SessionManager::new(ConversationKey::new(1, 1, "a"), approval);
        manager
            .start_run(Arc::new(ScriptedRunner), vec![ChatMessage::user().content("hi").build()])
            .unwrap();

        let mut sub = manager.subscribe();
        let mut seen = Vec::new();
        while let Some(update) = sub.recv().await {
            let terminal = update.is_terminal();
            seen.push(update);
            if terminal {
                break;
            }
        }

        assert_eq!(seen.len(), 3);
        assert!(seen.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn late_subscriber_replays_buffer_before_going_live() {
        let approval = Arc::new(ApprovalGate::new([]));
        let manager = SessionManager::new(ConversationKey::new(1, 1, "a"), approval);
        manager
            .start_run(Arc::new(ScriptedRunner), vec![ChatMessage::user().content("hi").build()])
            .unwrap();

        // give the spawned task a chance to finish publishing
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let mut sub = manager.subscribe();
        let mut count = 0;
        while let Some(update) = sub.recv().await {
            count += 1;
            if update.is_terminal() {
                break;
            }
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn idle_session_has_no_pending_approval() {
        let approval = Arc::new(ApprovalGate::new([]));
        let manager = SessionManager::new(ConversationKey::new(1, 1, "a"), approval);
        let state = manager.stream_state();
        assert_eq!(state.status, SessionStatus::Idle);
        assert!(!state.has_pending_approval);
        assert_eq!(state.buffer_size_hint, 0);
    }
}
