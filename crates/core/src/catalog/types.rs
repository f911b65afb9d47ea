//! Types for the posting catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactRefs;
use crate::driver::{DriverError, ElementHandle};

/// Normalized listing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingStatus {
    Active,
    Expired,
    Deleted,
    Flagged,
    Pending,
    Other,
}

impl ListingStatus {
    /// Normalize the status string the platform displays.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if raw.contains("deleted") || raw.contains("removed") {
            Self::Deleted
        } else if raw.contains("expired") {
            Self::Expired
        } else if raw.contains("flagged") {
            Self::Flagged
        } else if raw.contains("pending") || raw.contains("processing") {
            Self::Pending
        } else if raw.contains("active") || raw.contains("posted") {
            Self::Active
        } else {
            Self::Other
        }
    }
}

/// An action the operator can take on a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Renew,
    Repost,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Renew => "renew",
            ActionKind::Repost => "repost",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Affordances detected in a row. Renew and repost are independent; `Both`
/// means both controls are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvailableAction {
    None,
    Repost,
    Renew,
    Both,
}

impl AvailableAction {
    pub fn from_flags(renew: bool, repost: bool) -> Self {
        match (renew, repost) {
            (true, true) => Self::Both,
            (true, false) => Self::Renew,
            (false, true) => Self::Repost,
            (false, false) => Self::None,
        }
    }

    pub fn includes(&self, action: ActionKind) -> bool {
        matches!(
            (self, action),
            (Self::Both, _)
                | (Self::Renew, ActionKind::Renew)
                | (Self::Repost, ActionKind::Repost)
        )
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// What the eligibility filter decided for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    SkippedIneligible,
    SkippedDryRun,
    Attempted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Success => "success",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        }
    }

    /// Whether the listing reached a final outcome.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

/// Why a listing ended `skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Ineligible,
    DryRun,
    Deadline,
    OperatorAbort,
    SessionLost,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Ineligible => "ineligible",
            SkipReason::DryRun => "dry-run",
            SkipReason::Deadline => "deadline",
            SkipReason::OperatorAbort => "operator-abort",
            SkipReason::SessionLost => "session-lost",
        }
    }
}

/// One listing as read from a catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingObservation {
    pub listing_id: String,
    pub title: String,
    pub raw_status: String,
    pub status: ListingStatus,
    pub available_action: AvailableAction,
}

/// A live catalog row: the observation plus handles to its controls.
#[derive(Debug, Clone)]
pub struct RowMatch {
    pub row: ElementHandle,
    pub observation: ListingObservation,
    pub renew_control: Option<ElementHandle>,
    pub repost_control: Option<ElementHandle>,
}

impl RowMatch {
    /// The control dispatching `action`, if the row offers it.
    pub fn control(&self, action: ActionKind) -> Option<&ElementHandle> {
        match action {
            ActionKind::Renew => self.renew_control.as_ref(),
            ActionKind::Repost => self.repost_control.as_ref(),
        }
    }
}

/// A listing tracked through one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_id: String,
    pub title: String,
    pub raw_status: String,
    pub status: ListingStatus,
    pub available_action: AvailableAction,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intended_action: Option<ActionKind>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Last error when the outcome is `failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub attempts: u32,
    pub first_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifacts: ArtifactRefs,
}

impl ListingRecord {
    /// A fresh record for a listing seen during extraction.
    ///
    /// The decision is provisional until the eligibility filter runs.
    pub fn observed(observation: ListingObservation, first_seen_at: DateTime<Utc>) -> Self {
        Self {
            listing_id: observation.listing_id,
            title: observation.title,
            raw_status: observation.raw_status,
            status: observation.status,
            available_action: observation.available_action,
            decision: Decision::SkippedIneligible,
            intended_action: None,
            outcome: Outcome::Pending,
            skip_reason: None,
            failure: None,
            attempts: 0,
            first_seen_at,
            completed_at: None,
            artifacts: ArtifactRefs::default(),
        }
    }

    /// Mark a listing that was never started as skipped.
    pub fn skip(&mut self, reason: SkipReason) {
        self.outcome = Outcome::Skipped;
        self.skip_reason = Some(reason);
        self.completed_at = Some(Utc::now());
    }

    /// Whether the eligibility filter selected this listing.
    pub fn is_eligible(&self) -> bool {
        !matches!(self.decision, Decision::SkippedIneligible)
    }
}

/// A row dropped during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWarning {
    /// Position of the row in the table, header rows included.
    pub index: usize,
    pub reason: String,
}

/// Result of one catalog extraction.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Listings in page order.
    pub listings: Vec<ListingRecord>,
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The page does not look like the postings table at all.
    #[error("Catalog structure not recognized: {0}")]
    StructuralMismatch(String),

    /// One row could not be read; the rest of the catalog is usable.
    #[error("Row {index} skipped: {reason}")]
    RowSkipped { index: usize, reason: String },

    #[error("Driver error during extraction: {0}")]
    Driver(#[from] DriverError),
}

impl ParseError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RowSkipped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(ListingStatus::from_raw("Active"), ListingStatus::Active);
        assert_eq!(ListingStatus::from_raw(" expired "), ListingStatus::Expired);
        assert_eq!(ListingStatus::from_raw("deleted by author"), ListingStatus::Deleted);
        assert_eq!(ListingStatus::from_raw("flagged"), ListingStatus::Flagged);
        assert_eq!(ListingStatus::from_raw("Pending review"), ListingStatus::Pending);
        assert_eq!(ListingStatus::from_raw("draft"), ListingStatus::Other);
    }

    #[test]
    fn test_available_action_flags() {
        assert_eq!(AvailableAction::from_flags(true, true), AvailableAction::Both);
        assert_eq!(AvailableAction::from_flags(true, false), AvailableAction::Renew);
        assert_eq!(AvailableAction::from_flags(false, true), AvailableAction::Repost);
        assert_eq!(AvailableAction::from_flags(false, false), AvailableAction::None);
    }

    #[test]
    fn test_available_action_includes() {
        assert!(AvailableAction::Both.includes(ActionKind::Renew));
        assert!(AvailableAction::Both.includes(ActionKind::Repost));
        assert!(AvailableAction::Renew.includes(ActionKind::Renew));
        assert!(!AvailableAction::Renew.includes(ActionKind::Repost));
        assert!(!AvailableAction::None.includes(ActionKind::Renew));
        assert!(!AvailableAction::None.is_actionable());
    }

    #[test]
    fn test_record_serializes_kebab_case() {
        let mut record = ListingRecord::observed(
            ListingObservation {
                listing_id: "7712345678".to_string(),
                title: "Oak desk".to_string(),
                raw_status: "Active".to_string(),
                status: ListingStatus::Active,
                available_action: AvailableAction::Both,
            },
            Utc::now(),
        );
        record.decision = Decision::SkippedDryRun;
        record.skip(SkipReason::DryRun);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["decision"], "skipped-dry-run");
        assert_eq!(json["skip_reason"], "dry-run");
        assert_eq!(json["available_action"], "both");
        assert_eq!(json["outcome"], "skipped");
        assert!(json.get("failure").is_none());
    }

    #[test]
    fn test_parse_error_fatality() {
        assert!(ParseError::StructuralMismatch("no table".into()).is_fatal());
        assert!(!ParseError::RowSkipped {
            index: 2,
            reason: "missing title".into()
        }
        .is_fatal());
    }
}
