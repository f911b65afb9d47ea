use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use super::RunEvent;

/// A run event stamped with the moment it was emitted.
#[derive(Debug, Clone)]
pub struct StampedEvent {
    pub emitted_at: DateTime<Utc>,
    pub event: RunEvent,
}

/// Cloneable sender half of the run event channel.
///
/// Auditing never fails a run: once the writer is gone, events are dropped
/// with a warning that names the run and the event type only.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<StampedEvent>,
}

impl EventHandle {
    pub(super) fn new(tx: mpsc::Sender<StampedEvent>) -> Self {
        Self { tx }
    }

    /// Stamp and queue an event, waiting while the channel is full.
    pub async fn emit(&self, event: RunEvent) {
        let stamped = StampedEvent {
            emitted_at: Utc::now(),
            event,
        };
        if let Err(mpsc::error::SendError(lost)) = self.tx.send(stamped).await {
            warn!(
                run_id = %lost.event.run_id(),
                event_type = lost.event.event_type(),
                "Event writer gone, run event dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(to: &str) -> RunEvent {
        RunEvent::StateChanged {
            run_id: "r-1".to_string(),
            from: "init".to_string(),
            to: to.to_string(),
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_emit_stamps_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = EventHandle::new(tx);

        let before = Utc::now();
        handle.emit(state_changed("authenticating")).await;
        let after = Utc::now();

        let stamped = rx.recv().await.unwrap();
        assert!(stamped.emitted_at >= before && stamped.emitted_at <= after);
        assert_eq!(stamped.event.event_type(), "state_changed");
    }

    #[tokio::test]
    async fn test_clones_share_one_ordered_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let orchestrator = EventHandle::new(tx);
        let executor = orchestrator.clone();

        orchestrator.emit(state_changed("authenticating")).await;
        executor.emit(state_changed("cataloging")).await;
        orchestrator.emit(state_changed("selecting")).await;

        let mut order = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.unwrap().event {
                RunEvent::StateChanged { to, .. } => order.push(to),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(order, vec!["authenticating", "cataloging", "selecting"]);
    }

    #[tokio::test]
    async fn test_emit_after_writer_gone() {
        let (tx, rx) = mpsc::channel::<StampedEvent>(4);
        let handle = EventHandle::new(tx);
        drop(rx);

        // Dropped with a warning, the caller carries on
        handle.emit(state_changed("aborted")).await;
    }
}
