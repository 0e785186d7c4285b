use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// One entry on a run's live timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub run_id: Uuid,
    pub phase: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out of status events to any number of listeners.
///
/// Publishing never blocks and never fails: with no listeners the event is
/// only logged, and a slow listener lags without affecting the publisher.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, run_id: Uuid, phase: &str, message: &str) {
        if phase == "ERROR" {
            tracing::error!(%run_id, phase, message, "Workflow status");
        } else {
            tracing::info!(%run_id, phase, message, "Workflow status");
        }

        let event = StatusEvent {
            run_id,
            phase: phase.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// A publisher bound to one run.
    pub fn for_run(&self, run_id: Uuid) -> RunStatus {
        RunStatus {
            run_id,
            broadcaster: self.clone(),
        }
    }
}

/// Publishes status events stamped with a fixed run id.
#[derive(Debug, Clone)]
pub struct RunStatus {
    run_id: Uuid,
    broadcaster: StatusBroadcaster,
}

impl RunStatus {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn publish(&self, phase: &str, message: &str) {
        self.broadcaster.publish(self.run_id, phase, message);
    }
}
