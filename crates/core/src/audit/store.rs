use thiserror::Error;

use super::EventRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

const DEFAULT_LIMIT: i64 = 1000;

/// Which part of the audit log to read back.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub run_id: Option<String>,
    pub listing_id: Option<String>,
    pub event_type: Option<String>,
    pub limit: i64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            run_id: None,
            listing_id: None,
            event_type: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything one run emitted.
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    pub fn with_listing_id(mut self, listing_id: impl Into<String>) -> Self {
        self.listing_id = Some(listing_id.into());
        self
    }

    /// Restrict to one `RunEvent` tag, e.g. `listing_completed`.
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Append-only log of run events.
pub trait EventStore: Send + Sync {
    /// Append a record, returning its position in the log.
    fn append(&self, record: &EventRecord) -> Result<i64, AuditError>;

    /// Matching records in the order they were appended.
    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, AuditError>;

    fn count(&self, filter: &EventFilter) -> Result<i64, AuditError>;
}
