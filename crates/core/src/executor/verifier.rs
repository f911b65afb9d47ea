use crate::catalog::{ActionKind, ListingObservation, ListingStatus};

/// Decides whether a dispatched action took effect.
///
/// `after` is a fresh read of the listing's row, `None` when the row is gone.
pub trait ActionVerifier: Send + Sync {
    fn verify(
        &self,
        action: ActionKind,
        before: &ListingObservation,
        after: Option<&ListingObservation>,
    ) -> bool;
}

/// Succeeds when the dispatched control is no longer offered or the row vanished.
#[derive(Debug, Clone, Default)]
pub struct AffordanceVerifier;

impl ActionVerifier for AffordanceVerifier {
    fn verify(
        &self,
        action: ActionKind,
        _before: &ListingObservation,
        after: Option<&ListingObservation>,
    ) -> bool {
        match after {
            None => true,
            Some(after) => !after.available_action.includes(action),
        }
    }
}

/// Succeeds when the row's normalized status changed to one of `expected`.
#[derive(Debug, Clone)]
pub struct StatusVerifier {
    expected: Vec<ListingStatus>,
}

impl StatusVerifier {
    pub fn new(expected: impl IntoIterator<Item = ListingStatus>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
        }
    }
}

impl Default for StatusVerifier {
    fn default() -> Self {
        Self::new([ListingStatus::Active])
    }
}

impl ActionVerifier for StatusVerifier {
    fn verify(
        &self,
        _action: ActionKind,
        before: &ListingObservation,
        after: Option<&ListingObservation>,
    ) -> bool {
        after.is_some_and(|after| {
            after.status != before.status && self.expected.contains(&after.status)
        })
    }
}
