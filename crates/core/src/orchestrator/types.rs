//! Types for the run orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactRefs;
use crate::catalog::{ListingRecord, Outcome, RowWarning};
use crate::config::RunConfig;

/// Run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Authenticating,
    Cataloging,
    Selecting,
    Executing,
    Finalizing,
    Done,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Authenticating => "authenticating",
            RunState::Cataloging => "cataloging",
            RunState::Selecting => "selecting",
            RunState::Executing => "executing",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Authenticating)
                | (Authenticating, Cataloging)
                | (Authenticating, Aborted)
                | (Cataloging, Selecting)
                | (Cataloging, Aborted)
                | (Selecting, Executing)
                | (Executing, Finalizing)
                | (Finalizing, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RunState,
    pub to: RunState,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub detected: usize,
    pub eligible: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunCounts {
    /// Tally a list of records. `skipped` counts eligible listings only.
    pub fn tally(listings: &[ListingRecord]) -> Self {
        let mut counts = RunCounts {
            detected: listings.len(),
            ..Default::default()
        };
        for listing in listings.iter().filter(|l| l.is_eligible()) {
            counts.eligible += 1;
            match listing.outcome {
                Outcome::Success => counts.succeeded += 1,
                Outcome::Failed => counts.failed += 1,
                // Finalization resolves every pending listing before tallying.
                Outcome::Skipped | Outcome::Pending => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn ineligible(&self) -> usize {
        self.detected - self.eligible
    }
}

/// The structured result of one run.
///
/// Written once at finalization. Never contains credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub config: RunConfig,
    pub counts: RunCounts,
    /// Every detected listing, in catalog order.
    pub listings: Vec<ListingRecord>,
    pub row_warnings: Vec<RowWarning>,
    pub transitions: Vec<StateTransition>,
    /// Run-level captures: the final page source, or the abort debug pair.
    #[serde(default)]
    pub run_artifacts: ArtifactRefs,
}

impl RunSummary {
    /// Eligible listings only, in catalog order.
    pub fn eligible_listings(&self) -> impl Iterator<Item = &ListingRecord> {
        self.listings.iter().filter(|l| l.is_eligible())
    }

    pub fn listing(&self, listing_id: &str) -> Option<&ListingRecord> {
        self.listings.iter().find(|l| l.listing_id == listing_id)
    }
}

/// Crash-recovery snapshot written after every listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub state: RunState,
    pub written_at: DateTime<Utc>,
    /// Listings resolved so far.
    pub resolved: Vec<ListingRecord>,
}

/// Requests an early, orderly end of a run.
///
/// Checked at listing boundaries; the listing in flight finishes first.
#[derive(Debug, Clone, Default)]
pub struct RunAbortHandle {
    flag: Arc<AtomicBool>,
}

impl RunAbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        AvailableAction, Decision, ListingObservation, ListingStatus, SkipReason,
    };

    fn record(id: &str, decision: Decision, outcome: Outcome) -> ListingRecord {
        let mut record = ListingRecord::observed(
            ListingObservation {
                listing_id: id.to_string(),
                title: "t".to_string(),
                raw_status: "Active".to_string(),
                status: ListingStatus::Active,
                available_action: AvailableAction::Renew,
            },
            Utc::now(),
        );
        record.decision = decision;
        record.outcome = outcome;
        record
    }

    #[test]
    fn test_legal_transitions() {
        assert!(RunState::Init.can_transition_to(RunState::Authenticating));
        assert!(RunState::Authenticating.can_transition_to(RunState::Aborted));
        assert!(RunState::Cataloging.can_transition_to(RunState::Aborted));
        assert!(RunState::Selecting.can_transition_to(RunState::Executing));
        assert!(RunState::Executing.can_transition_to(RunState::Finalizing));
        assert!(RunState::Finalizing.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!RunState::Init.can_transition_to(RunState::Executing));
        assert!(!RunState::Selecting.can_transition_to(RunState::Aborted));
        assert!(!RunState::Executing.can_transition_to(RunState::Done));
        assert!(!RunState::Finalizing.can_transition_to(RunState::Aborted));
        assert!(!RunState::Done.can_transition_to(RunState::Init));
        assert!(!RunState::Aborted.can_transition_to(RunState::Finalizing));
    }

    #[test]
    fn test_counts_tally() {
        let mut skipped = record("4", Decision::Attempted, Outcome::Skipped);
        skipped.skip_reason = Some(SkipReason::Deadline);
        let listings = vec![
            record("1", Decision::Attempted, Outcome::Success),
            record("2", Decision::Attempted, Outcome::Failed),
            record("3", Decision::SkippedIneligible, Outcome::Skipped),
            skipped,
            record("5", Decision::SkippedDryRun, Outcome::Skipped),
        ];

        let counts = RunCounts::tally(&listings);
        assert_eq!(counts.detected, 5);
        assert_eq!(counts.eligible, 4);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 2);
        assert_eq!(counts.ineligible(), 1);
        assert_eq!(
            counts.eligible,
            counts.succeeded + counts.failed + counts.skipped
        );
    }

    #[test]
    fn test_abort_handle_shared() {
        let handle = RunAbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(RunState::Authenticating).unwrap(),
            "authenticating"
        );
        assert_eq!(RunState::Done.to_string(), "done");
    }
}
