//! Per-session single-flight gate for forum-topic creation.
//!
//! The first event for an unknown session must create exactly one topic;
//! every event racing with it must wait for that same topic. The gate is a
//! single map of `session_id → watch` handle: the task that installs the
//! entry becomes the leader and performs creation, everyone else gets a
//! receiver to await. The map mutex is held only for the map read/write,
//! never across the chat API call.
//!
//! A leader that returns early without resolving (error path, panic)
//! resolves its flight as failed on drop, so waiters are never stranded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use muxgram_core::SessionId;

/// Progress of one topic-creation flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightState {
    /// The leader is still working.
    Pending,
    /// The topic exists.
    Ready(i64),
    /// Creation failed; waiters drop their messages.
    Failed,
}

/// Why a wait did not produce a thread id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The leader reported failure.
    #[error("topic creation failed")]
    Failed,
    /// The bounded wait elapsed.
    #[error("timed out waiting for topic creation")]
    Timeout,
}

type FlightMap = Arc<Mutex<HashMap<SessionId, watch::Receiver<FlightState>>>>;

/// The single-flight gate.
#[derive(Clone, Default)]
pub struct TopicCoordinator {
    inflight: FlightMap,
}

/// Outcome of [`TopicCoordinator::begin`].
pub enum Flight {
    /// This task owns creation; it must resolve the handle.
    Leader(FlightLeader),
    /// Another task is creating; await the receiver.
    Follower(watch::Receiver<FlightState>),
}

impl TopicCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically join or start the flight for `id`.
    pub fn begin(&self, id: &SessionId) -> Flight {
        let mut map = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = map.get(id) {
            return Flight::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(FlightState::Pending);
        map.insert(id.clone(), rx);
        Flight::Leader(FlightLeader {
            id: id.clone(),
            tx,
            map: Arc::clone(&self.inflight),
            resolved: false,
        })
    }

    /// Number of flights currently in the air (tests, diagnostics).
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Await a follower receiver, bounded by `timeout`.
    pub async fn wait(
        mut rx: watch::Receiver<FlightState>,
        timeout: Duration,
    ) -> Result<i64, WaitError> {
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                let state = rx.borrow_and_update().clone();
                match state {
                    FlightState::Ready(thread_id) => return Ok(thread_id),
                    FlightState::Failed => return Err(WaitError::Failed),
                    FlightState::Pending => {}
                }
                if rx.changed().await.is_err() {
                    // Sender gone; its drop guarantees a terminal value.
                    let state = rx.borrow().clone();
                    return match state {
                        FlightState::Ready(thread_id) => Ok(thread_id),
                        _ => Err(WaitError::Failed),
                    };
                }
            }
        })
        .await;
        outcome.unwrap_or(Err(WaitError::Timeout))
    }
}

/// The leader's obligation to resolve its flight.
pub struct FlightLeader {
    id: SessionId,
    tx: watch::Sender<FlightState>,
    map: FlightMap,
    resolved: bool,
}

impl FlightLeader {
    /// Resolve with the created thread id and retire the flight.
    pub fn complete(mut self, thread_id: i64) {
        self.finish(FlightState::Ready(thread_id));
    }

    /// Resolve as failed and retire the flight.
    pub fn fail(mut self) {
        self.finish(FlightState::Failed);
    }

    fn finish(&mut self, state: FlightState) {
        let _ = self.tx.send(state);
        self.map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        self.resolved = true;
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if !self.resolved {
            self.finish(FlightState::Failed);
        }
    }
}
