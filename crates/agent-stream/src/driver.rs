use std::time::Duration;

use agent_events::Event;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::reduce::reduce;
use crate::state::AdapterState;
use crate::update::ConversationUpdate;

const DEFAULT_BATCH_INTERVAL_MS: u64 = 33;

/// Owns the reducer state plus the timer that batches assistant text
/// deltas. `reduce` itself stays pure and I/O-free; this is the thin async
/// shell around it.
pub struct StreamAdapter {
    state: AdapterState,
    batch_interval: Duration,
}

impl Default for StreamAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self { state: AdapterState::new(), batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS) }
    }

    pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
        self.batch_interval = batch_interval;
        self
    }

    pub fn state(&self) -> &AdapterState {
        &self.state
    }

    /// Drains `events` until the channel closes, forwarding reduced updates
    /// to `out`. Consecutive `AssistantTextAppended` updates for the same
    /// message are coalesced to at most one per timer tick; every other
    /// update forces an immediate flush of whatever delta is pending.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>, out: mpsc::Sender<ConversationUpdate>) {
        let mut ticker = interval(self.batch_interval);
        ticker.tick().await;
        let mut pending: Option<ConversationUpdate> = None;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    for update in reduce(&mut self.state, &event) {
                        self.dispatch(update, &mut pending, &out).await;
                    }
                }
                _ = ticker.tick() => {
                    if let Some(update) = pending.take() {
                        if out.send(update).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        if let Some(update) = pending.take() {
            let _ = out.send(update).await;
        }
    }

    async fn dispatch(&self, update: ConversationUpdate, pending: &mut Option<ConversationUpdate>, out: &mpsc::Sender<ConversationUpdate>) {
        if matches!(update, ConversationUpdate::AssistantTextAppended { .. }) {
            *pending = Some(update);
            return;
        }
        if let Some(buffered) = pending.take() {
            if out.send(buffered).await.is_err() {
                return;
            }
        }
        let _ = out.send(update).await;
    }
}
