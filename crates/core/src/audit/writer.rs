use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{EventHandle, EventRecord, EventStore, RunEvent, StampedEvent};

/// What the writer persisted before its channel closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: u64,
    pub failed: u64,
    /// Runs whose `run_finished` event made it into the store.
    pub finished_runs: Vec<String>,
}

/// Background task appending run events to the audit log.
pub struct EventWriter {
    rx: mpsc::Receiver<StampedEvent>,
    store: Arc<dyn EventStore>,
    per_run: HashMap<String, u64>,
    report: WriteReport,
}

impl EventWriter {
    fn new(rx: mpsc::Receiver<StampedEvent>, store: Arc<dyn EventStore>) -> Self {
        Self {
            rx,
            store,
            per_run: HashMap::new(),
            report: WriteReport::default(),
        }
    }

    /// Drain the channel until every `EventHandle` is dropped.
    ///
    /// A failed append is logged and counted; later events are still written.
    pub async fn run(mut self) -> WriteReport {
        debug!("Event writer started");
        while let Some(stamped) = self.rx.recv().await {
            self.persist(stamped);
        }
        debug!(
            written = self.report.written,
            failed = self.report.failed,
            "Event writer drained"
        );
        self.report
    }

    fn persist(&mut self, stamped: StampedEvent) {
        let finished = matches!(stamped.event, RunEvent::RunFinished { .. });
        let record = EventRecord::new(stamped.emitted_at, stamped.event);

        match self.store.append(&record) {
            Ok(_) => {
                self.report.written += 1;
                let count = self.per_run.entry(record.run_id.clone()).or_default();
                *count += 1;
                if finished {
                    info!(run_id = %record.run_id, events = *count, "Run events persisted");
                    self.report.finished_runs.push(record.run_id);
                }
            }
            Err(e) => {
                self.report.failed += 1;
                error!(
                    run_id = %record.run_id,
                    event_type = %record.event_type,
                    "Failed to persist run event: {}",
                    e
                );
            }
        }
    }
}

/// Wire a handle to a writer over a channel of `buffer_size` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and await it after
/// the last handle is dropped to get its `WriteReport`.
pub fn create_event_system(
    store: Arc<dyn EventStore>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), EventWriter::new(rx, store))
}
