use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        mode: String,
        /// SHA-256 of the serialized run config.
        config_hash: String,
    },
    StateChanged {
        run_id: String,
        from: String,
        to: String,
        reason: Option<String>,
    },
    /// A catalog row was dropped during extraction.
    RowSkipped {
        run_id: String,
        index: usize,
        reason: String,
    },
    /// One dispatch of an affordance; `error` is set when the attempt failed.
    ListingAttempted {
        run_id: String,
        listing_id: String,
        attempt: u32,
        action: String,
        error: Option<String>,
    },
    ListingCompleted {
        run_id: String,
        listing_id: String,
        outcome: String,
        attempts: u32,
    },
    ArtifactCaptured {
        run_id: String,
        listing_id: Option<String>,
        kind: String,
        key: String,
        size_bytes: u64,
    },
    RunFinished {
        run_id: String,
        state: String,
        detected: usize,
        eligible: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

impl RunEvent {
    /// Get the event type as a string (matches serde tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StateChanged { .. } => "state_changed",
            Self::RowSkipped { .. } => "row_skipped",
            Self::ListingAttempted { .. } => "listing_attempted",
            Self::ListingCompleted { .. } => "listing_completed",
            Self::ArtifactCaptured { .. } => "artifact_captured",
            Self::RunFinished { .. } => "run_finished",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StateChanged { run_id, .. }
            | Self::RowSkipped { run_id, .. }
            | Self::ListingAttempted { run_id, .. }
            | Self::ListingCompleted { run_id, .. }
            | Self::ArtifactCaptured { run_id, .. }
            | Self::RunFinished { run_id, .. } => run_id,
        }
    }

    /// Listing the event refers to, if any.
    pub fn listing_id(&self) -> Option<&str> {
        match self {
            Self::ListingAttempted { listing_id, .. }
            | Self::ListingCompleted { listing_id, .. } => Some(listing_id),
            Self::ArtifactCaptured { listing_id, .. } => listing_id.as_deref(),
            _ => None,
        }
    }
}

/// Stored event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub run_id: String,
    pub listing_id: Option<String>,
    pub data: RunEvent,
}

impl EventRecord {
    /// Record for `event`, not yet assigned a position in the log.
    pub fn new(timestamp: DateTime<Utc>, event: RunEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            run_id: event.run_id().to_string(),
            listing_id: event.listing_id().map(String::from),
            data: event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tag_matches_event_type() {
        let event = RunEvent::ListingAttempted {
            run_id: "r-1".to_string(),
            listing_id: "7712345678".to_string(),
            attempt: 2,
            action: "renew".to_string(),
            error: Some("stale element".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["attempt"], 2);

        let back: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_run_and_listing_ids() {
        let started = RunEvent::RunStarted {
            run_id: "r-1".to_string(),
            mode: "renew".to_string(),
            config_hash: "abc".to_string(),
        };
        assert_eq!(started.run_id(), "r-1");
        assert_eq!(started.listing_id(), None);

        let completed = RunEvent::ListingCompleted {
            run_id: "r-1".to_string(),
            listing_id: "42".to_string(),
            outcome: "success".to_string(),
            attempts: 1,
        };
        assert_eq!(completed.listing_id(), Some("42"));

        let run_artifact = RunEvent::ArtifactCaptured {
            run_id: "r-1".to_string(),
            listing_id: None,
            kind: "html-snapshot".to_string(),
            key: "r-1/run-html-snapshot.html".to_string(),
            size_bytes: 10,
        };
        assert_eq!(run_artifact.listing_id(), None);
        assert_eq!(run_artifact.event_type(), "artifact_captured");
    }
}
