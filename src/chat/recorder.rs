//! Off-the-response-path persistence of finished turns.
//!
//! Turns are queued on a bounded channel and written by a single background task.
//! Each write is retried with linear backoff plus jitter; a turn that still fails is
//! dead-lettered to the log at `error` level with its full content so it can be
//! recovered by hand. Nothing here ever reports back to the caller of `record`.
//!
//! Until its write lands, an accepted turn stays in a per-session pending buffer so
//! history reads through [`TurnRecorder::recent_turns`] still see it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::context::PriorTurn;
use crate::config::PersistenceConfig;
use crate::db::{models::NewTurn, StoreError, TurnStore};

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&PersistenceConfig> for RecorderSettings {
    fn from(cfg: &PersistenceConfig) -> Self {
        Self {
            queue_capacity: cfg.queue_capacity.max(1),
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

enum Command {
    Record(u64, NewTurn),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Accepted turns that have not been written or dead-lettered yet.
#[derive(Default)]
struct Pending {
    next_ticket: AtomicU64,
    turns: Mutex<HashMap<String, Vec<(u64, NewTurn)>>>,
    // Held for writing while a store write and its buffer removal happen together,
    // and for reading while a history read snapshots store and buffer.
    gate: RwLock<()>,
}

impl Pending {
    fn add(&self, turn: &NewTurn) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut turns) = self.turns.lock() {
            turns.entry(turn.session_id.clone()).or_default().push((ticket, turn.clone()));
        }
        ticket
    }

    fn remove(&self, session_id: &str, ticket: u64) {
        if let Ok(mut turns) = self.turns.lock() {
            if let Some(queue) = turns.get_mut(session_id) {
                queue.retain(|(t, _)| *t != ticket);
                if queue.is_empty() {
                    turns.remove(session_id);
                }
            }
        }
    }

    fn snapshot(&self, session_id: &str) -> Vec<PriorTurn> {
        self.turns
            .lock()
            .map(|turns| {
                turns
                    .get(session_id)
                    .map(|queue| {
                        queue
                            .iter()
                            .map(|(_, t)| PriorTurn::new(t.user_message.clone(), t.ai_message.clone()))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct TurnRecorder {
    tx: mpsc::Sender<Command>,
    store: Arc<dyn TurnStore>,
    pending: Arc<Pending>,
}

impl TurnRecorder {
    /// Starts the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn TurnStore>, settings: RecorderSettings) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let pending = Arc::new(Pending::default());
        let worker = tokio::spawn(run_worker(rx, store.clone(), pending.clone(), settings));
        (Self { tx, store, pending }, worker)
    }

    /// Queues a turn without waiting. Returns false when the turn was dropped because
    /// the queue is full or the writer has stopped.
    pub fn record(&self, turn: NewTurn) -> bool {
        let ticket = self.pending.add(&turn);
        match self.tx.try_send(Command::Record(ticket, turn)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(Command::Record(ticket, turn))) => {
                self.pending.remove(&turn.session_id, ticket);
                warn!(
                    session_id = %turn.session_id,
                    is_trap = turn.is_trap,
                    "Turn log queue full, dropping turn"
                );
                false
            }
            Err(e) => {
                if let Command::Record(ticket, turn) = e.into_inner() {
                    self.pending.remove(&turn.session_id, ticket);
                }
                warn!("Turn log writer unavailable, dropping turn");
                false
            }
        }
    }

    /// The newest `limit` turns of a session, oldest first, counting turns that are
    /// accepted but still waiting in the queue.
    pub async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<PriorTurn>, StoreError> {
        let _gate = self.pending.gate.read().await;

        let mut turns: Vec<PriorTurn> = self
            .store
            .recent_turns(session_id, limit)
            .await?
            .into_iter()
            .map(PriorTurn::from)
            .collect();
        turns.extend(self.pending.snapshot(session_id));

        let skip = turns.len().saturating_sub(limit);
        Ok(turns.split_off(skip))
    }

    /// Waits until every turn queued before this call has been written or dead-lettered.
    /// The queue stays open.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stops accepting turns. The writer drains what is already queued and then exits;
    /// await its `JoinHandle` to wait for that.
    pub async fn close(&self) {
        let _ = self.tx.send(Command::Close).await;
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Command>,
    store: Arc<dyn TurnStore>,
    pending: Arc<Pending>,
    settings: RecorderSettings,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Record(ticket, turn) => {
                write_with_retry(store.as_ref(), &pending, ticket, &turn, &settings).await
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Close => {
                info!("Turn log queue closed, draining");
                rx.close();
            }
        }
    }
    debug!("Turn log writer stopped");
}

async fn write_with_retry(
    store: &dyn TurnStore,
    pending: &Pending,
    ticket: u64,
    turn: &NewTurn,
    settings: &RecorderSettings,
) {
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = {
            let _gate = pending.gate.write().await;
            let result = store.append_turn(turn).await;
            if result.is_ok() {
                pending.remove(&turn.session_id, ticket);
            }
            result
        };

        match result {
            Ok(saved) => {
                debug!(id = saved.id, session_id = %saved.session_id, "Turn persisted");
                return;
            }
            Err(e) if attempt < settings.max_attempts => {
                warn!(attempt, session_id = %turn.session_id, "Turn write failed, retrying: {}", e);
                tokio::time::sleep(backoff_delay(settings.backoff, attempt)).await;
            }
            Err(e) => {
                pending.remove(&turn.session_id, ticket);
                dead_letter(turn, attempt, &e);
                return;
            }
        }
    }
}

fn dead_letter(turn: &NewTurn, attempts: u32, err: &StoreError) {
    error!(
        session_id = %turn.session_id,
        user_message = %turn.user_message,
        ai_message = %turn.ai_message,
        is_trap = turn.is_trap,
        timestamp = %turn.timestamp.to_rfc3339(),
        attempts,
        "Turn dropped after exhausting retries: {}",
        err
    );
}

/// Linear backoff with ±25% jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = (base.as_millis() as u64).saturating_mul(u64::from(attempt));
    let jitter_range = base_ms / 4;
    let jitter = if jitter_range > 0 {
        rand::random::<u64>() % (jitter_range * 2 + 1)
    } else {
        0
    };
    Duration::from_millis(base_ms.saturating_sub(jitter_range) + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::db::models::Turn;

    /// Refuses every write; reads see an empty table.
    struct StalledStore;

    #[async_trait]
    impl TurnStore for StalledStore {
        async fn append_turn(&self, _turn: &NewTurn) -> Result<Turn, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn recent_turns(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, StoreError> {
            Ok(Vec::new())
        }

        async fn session_turns(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_turns(&self) -> Result<Vec<Turn>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn turn(session_id: &str, user: &str) -> NewTurn {
        NewTurn {
            session_id: session_id.to_string(),
            user_message: user.to_string(),
            ai_message: format!("re: {user}"),
            is_trap: false,
            timestamp: Utc::now(),
        }
    }

    fn stalled(max_attempts: u32, backoff: Duration) -> (TurnRecorder, JoinHandle<()>) {
        TurnRecorder::spawn(
            Arc::new(StalledStore),
            RecorderSettings { queue_capacity: 8, max_attempts, backoff },
        )
    }

    #[test]
    fn backoff_grows_linearly_within_jitter_bounds() {
        let base = Duration::from_millis(100);
        for attempt in 1..=4u32 {
            let nominal = 100 * u64::from(attempt);
            let delay = backoff_delay(base, attempt).as_millis() as u64;
            assert!(delay >= nominal - nominal / 4 && delay <= nominal + nominal / 4);
        }
    }

    #[test]
    fn zero_base_means_no_delay() {
        assert_eq!(backoff_delay(Duration::ZERO, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn queued_turns_show_up_in_history_before_they_are_written() {
        let (recorder, _writer) = stalled(5, Duration::from_secs(60));

        assert!(recorder.record(turn("abc", "one")));
        assert!(recorder.record(turn("abc", "two")));
        assert!(recorder.record(turn("other", "elsewhere")));

        let history = recorder.recent_turns("abc", 4).await.unwrap();
        assert_eq!(history, vec![PriorTurn::new("one", "re: one"), PriorTurn::new("two", "re: two")]);

        let newest = recorder.recent_turns("abc", 1).await.unwrap();
        assert_eq!(newest, vec![PriorTurn::new("two", "re: two")]);
    }

    #[tokio::test]
    async fn dead_lettered_turns_leave_the_pending_buffer() {
        let (recorder, _writer) = stalled(1, Duration::ZERO);

        recorder.record(turn("abc", "lost"));
        recorder.flush().await;

        assert!(recorder.recent_turns("abc", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_drains_the_queue_and_stops_the_writer() {
        let (recorder, writer) = stalled(1, Duration::ZERO);

        assert!(recorder.record(turn("abc", "before close")));
        recorder.close().await;
        writer.await.unwrap();

        assert!(!recorder.record(turn("abc", "after close")));
        assert!(recorder.recent_turns("abc", 4).await.unwrap().is_empty());
    }
}
