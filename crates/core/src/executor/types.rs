use thiserror::Error;

use crate::artifact::CapturePlan;
use crate::catalog::{ListingRecord, ParseError};
use crate::driver::DriverError;
use crate::pacing::Deadline;

/// Why one attempt on a listing did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The page was not ready (timeout, stale element, covered control).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The click went through but verification saw no change.
    #[error("Action had no visible effect: {0}")]
    NoEffect(String),

    /// The action cannot be performed (control gone, protocol error).
    #[error("Action not possible: {0}")]
    Rejected(String),

    /// The browser session ended.
    #[error("Session expired: {0}")]
    SessionExpired(String),
}

impl ActionError {
    /// Whether another attempt on the same listing may help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::NoEffect(_))
    }
}

impl From<DriverError> for ActionError {
    fn from(e: DriverError) -> Self {
        if e.is_session_lost() {
            Self::SessionExpired(e.to_string())
        } else if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Rejected(e.to_string())
        }
    }
}

impl From<ParseError> for ActionError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Driver(e) => e.into(),
            // Catalog did not come back (yet); the page may still be loading.
            other => Self::Transient(other.to_string()),
        }
    }
}

/// Per-listing inputs the orchestrator hands to the executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub deadline: &'a Deadline,
    pub plan: CapturePlan,
}

/// Result of executing one listing.
#[derive(Debug, Clone)]
pub struct Execution {
    /// The resolved listing.
    pub record: ListingRecord,
    /// Error of the last failed attempt, if the listing failed.
    pub error: Option<ActionError>,
}

impl Execution {
    pub fn session_expired(&self) -> bool {
        matches!(self.error, Some(ActionError::SessionExpired(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        assert!(matches!(
            ActionError::from(DriverError::StaleElement("x".into())),
            ActionError::Transient(_)
        ));
        assert!(matches!(
            ActionError::from(DriverError::not_found("input")),
            ActionError::Transient(_)
        ));
        assert!(matches!(
            ActionError::from(DriverError::SessionLost("gone".into())),
            ActionError::SessionExpired(_)
        ));
        assert!(matches!(
            ActionError::from(DriverError::Protocol("bad".into())),
            ActionError::Rejected(_)
        ));
    }

    #[test]
    fn test_parse_error_mapping() {
        assert!(matches!(
            ActionError::from(ParseError::StructuralMismatch("no table".into())),
            ActionError::Transient(_)
        ));
        assert!(matches!(
            ActionError::from(ParseError::Driver(DriverError::SessionLost("gone".into()))),
            ActionError::SessionExpired(_)
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(ActionError::Transient("t".into()).is_retryable());
        assert!(ActionError::NoEffect("n".into()).is_retryable());
        assert!(!ActionError::Rejected("r".into()).is_retryable());
        assert!(!ActionError::SessionExpired("s".into()).is_retryable());
    }
}
