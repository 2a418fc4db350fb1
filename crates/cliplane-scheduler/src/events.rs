//! State-change broadcast.
//!
//! Every admission and transition publishes a `StateChange` into an
//! in-process broadcast channel. The transport layer (HTTP streaming,
//! WebSocket, webhooks) subscribes and fans out; the core never polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use cliplane_models::{JobId, JobState};

const DEFAULT_CAPACITY: usize = 256;

/// One job state change, as published to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// Job that changed
    pub job_id: JobId,
    /// State entered
    pub state: JobState,
    /// ETA known at publish time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<i64>,
    /// When the change was published
    pub at: DateTime<Utc>,
}

/// Broadcast channel for job state changes.
///
/// Slow subscribers may lag and drop old changes; the channel is a
/// notification path, not the source of truth. Subscribers re-read the
/// store when they need exact state.
#[derive(Debug, Clone)]
pub struct StateChangeBus {
    tx: broadcast::Sender<StateChange>,
}

impl StateChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, change: StateChange) {
        let _ = self.tx.send(change);
    }
}

impl Default for StateChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_changes() {
        let bus = StateChangeBus::default();
        let mut rx = bus.subscribe();

        bus.publish(StateChange {
            job_id: JobId::from_string("j1"),
            state: JobState::Queued,
            eta_seconds: Some(480),
            at: Utc::now(),
        });

        let change = rx.recv().await.expect("receive change");
        assert_eq!(change.job_id.as_str(), "j1");
        assert_eq!(change.state, JobState::Queued);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = StateChangeBus::default();
        bus.publish(StateChange {
            job_id: JobId::from_string("j1"),
            state: JobState::Canceled,
            eta_seconds: None,
            at: Utc::now(),
        });
    }
}
