//! Mode-aware listing selection.
//!
//! Pure functions over a catalog snapshot; nothing here touches the browser.

use crate::catalog::{ActionKind, AvailableAction, Decision, ListingRecord, Outcome, SkipReason};
use crate::config::RunMode;

/// The action a listing would receive under `mode`, if it is eligible.
///
/// Dry-run reports renew when offered, otherwise repost.
pub fn intended_action(available: AvailableAction, mode: RunMode) -> Option<ActionKind> {
    match mode {
        RunMode::Renew => available
            .includes(ActionKind::Renew)
            .then_some(ActionKind::Renew),
        RunMode::Repost => available
            .includes(ActionKind::Repost)
            .then_some(ActionKind::Repost),
        RunMode::DryRun => {
            if available.includes(ActionKind::Renew) {
                Some(ActionKind::Renew)
            } else if available.includes(ActionKind::Repost) {
                Some(ActionKind::Repost)
            } else {
                None
            }
        }
    }
}

/// Every listing in catalog order, each with its decision.
///
/// Ineligible listings are resolved here as skipped.
pub fn classify(catalog: &[ListingRecord], mode: RunMode) -> Vec<ListingRecord> {
    catalog
        .iter()
        .cloned()
        .map(|mut record| {
            match intended_action(record.available_action, mode) {
                Some(action) => {
                    record.intended_action = Some(action);
                    record.decision = if mode == RunMode::DryRun {
                        Decision::SkippedDryRun
                    } else {
                        Decision::Attempted
                    };
                    record.outcome = Outcome::Pending;
                }
                None => {
                    record.intended_action = None;
                    record.decision = Decision::SkippedIneligible;
                    record.skip(SkipReason::Ineligible);
                }
            }
            record
        })
        .collect()
}

/// The eligible listings only, in catalog order.
pub fn select(catalog: &[ListingRecord], mode: RunMode) -> Vec<ListingRecord> {
    classify(catalog, mode)
        .into_iter()
        .filter(ListingRecord::is_eligible)
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::{ListingObservation, ListingStatus};

    fn record(id: &str, available: AvailableAction) -> ListingRecord {
        ListingRecord::observed(
            ListingObservation {
                listing_id: id.to_string(),
                title: format!("Listing {}", id),
                raw_status: "Active".to_string(),
                status: ListingStatus::Active,
                available_action: available,
            },
            Utc::now(),
        )
    }

    fn catalog() -> Vec<ListingRecord> {
        vec![
            record("1", AvailableAction::Repost),
            record("2", AvailableAction::None),
            record("3", AvailableAction::Renew),
            record("4", AvailableAction::Both),
        ]
    }

    fn ids(records: &[ListingRecord]) -> Vec<&str> {
        records.iter().map(|r| r.listing_id.as_str()).collect()
    }

    #[test]
    fn test_renew_mode_selects_renewable() {
        let selected = select(&catalog(), RunMode::Renew);
        assert_eq!(ids(&selected), vec!["3", "4"]);
        assert!(selected
            .iter()
            .all(|r| r.decision == Decision::Attempted
                && r.intended_action == Some(ActionKind::Renew)
                && r.outcome == Outcome::Pending));
    }

    #[test]
    fn test_repost_mode_selects_repostable() {
        let selected = select(&catalog(), RunMode::Repost);
        assert_eq!(ids(&selected), vec!["1", "4"]);
        assert!(selected
            .iter()
            .all(|r| r.intended_action == Some(ActionKind::Repost)));
    }

    #[test]
    fn test_dry_run_selects_union() {
        let selected = select(&catalog(), RunMode::DryRun);
        assert_eq!(ids(&selected), vec!["1", "3", "4"]);
        assert!(selected.iter().all(|r| r.decision == Decision::SkippedDryRun));
        assert_eq!(selected[0].intended_action, Some(ActionKind::Repost));
        assert_eq!(selected[2].intended_action, Some(ActionKind::Renew));
    }

    #[test]
    fn test_both_selected_by_every_mode() {
        let only_both = vec![record("9", AvailableAction::Both)];
        for mode in [RunMode::Renew, RunMode::Repost, RunMode::DryRun] {
            assert_eq!(select(&only_both, mode).len(), 1, "mode {:?}", mode);
        }
    }

    #[test]
    fn test_classify_keeps_every_record_in_order() {
        let classified = classify(&catalog(), RunMode::Renew);
        assert_eq!(ids(&classified), vec!["1", "2", "3", "4"]);

        let skipped: Vec<_> = classified.iter().filter(|r| !r.is_eligible()).collect();
        assert_eq!(skipped.len(), 2);
        for r in skipped {
            assert_eq!(r.decision, Decision::SkippedIneligible);
            assert_eq!(r.outcome, Outcome::Skipped);
            assert_eq!(r.skip_reason, Some(SkipReason::Ineligible));
            assert_eq!(r.intended_action, None);
        }
    }

    #[test]
    fn test_select_is_pure() {
        let input = catalog();
        let before = input.clone();
        let _ = select(&input, RunMode::DryRun);
        assert_eq!(input, before);
    }

    #[test]
    fn test_empty_catalog() {
        assert!(select(&[], RunMode::Renew).is_empty());
    }
}
